//! The singleton holder: a value slot plus the guard for its one-time construction.
//!
//! [`Holder<T>`] implements double-checked acquisition. The fast path is a single
//! `Acquire` load of the state; only callers that find the holder absent take the
//! construction lock, and they re-check the state under it before running the
//! constructor. Once the value is published it is never replaced or torn down
//! while shared references can exist.

use core::any::type_name;
use core::cell::UnsafeCell;
use core::convert::Infallible;
#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
use core::{
   future::{poll_fn, Future},
   pin::pin,
};
use core::{fmt, mem};

use crate::error::SingletonError;
use crate::policy::FailurePolicy;
use crate::state::{HolderLock, HolderState};

/// Process-wide slot for a lazily constructed instance of `T`.
///
/// Usually placed in a `static`:
///
/// ```rust
/// use lazy_singleton::Holder;
///
/// static NAME: Holder<String> = Holder::new();
///
/// let first = NAME.get_or_init(|| "primary".to_string());
/// let again = NAME.get_or_init(|| unreachable!());
/// assert!(std::ptr::eq(first, again));
/// ```
pub struct Holder<T> {
   value: UnsafeCell<mem::MaybeUninit<T>>,
   lock: HolderLock,
   policy: FailurePolicy,
}

impl<T> Holder<T> {
   /// Creates an absent holder that retries after failed constructions.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self::with_policy(FailurePolicy::Retry)
   }

   /// Creates an absent holder with the given failure policy.
   #[inline]
   #[must_use]
   pub const fn with_policy(policy: FailurePolicy) -> Self {
      Self {
         value: UnsafeCell::new(mem::MaybeUninit::uninit()),
         lock: HolderLock::new(),
         policy,
      }
   }

   /// Creates a holder that is already present (eager initialization).
   #[inline]
   #[must_use]
   pub const fn with_value(value: T) -> Self {
      Self {
         value: UnsafeCell::new(mem::MaybeUninit::new(value)),
         lock: HolderLock::present(),
         policy: FailurePolicy::Retry,
      }
   }

   /// The failure policy this holder was created with.
   #[inline]
   pub fn policy(&self) -> FailurePolicy {
      self.policy
   }

   /// Current lifecycle state. Never blocks.
   #[inline]
   pub fn state(&self) -> HolderState {
      self.lock.state()
   }

   /// Checks if the instance has been published. Never blocks.
   #[inline]
   pub fn is_present(&self) -> bool {
      self.lock.is_present()
   }

   /// Returns the instance if it has been published.
   ///
   /// Returns `None` while absent, constructing or poisoned. Never blocks.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      if self.is_present() {
         // SAFETY: The Acquire load in is_present() synchronizes with the Release
         // publication, so the value is fully written.
         Some(unsafe { self.get_unchecked() })
      } else {
         None
      }
   }

   /// Returns a mutable reference to the instance if present.
   ///
   /// Requires exclusive access, so no shared reference can observe the mutation.
   #[inline]
   pub fn get_mut(&mut self) -> Option<&mut T> {
      if self.is_present() {
         // SAFETY: Present and we hold `&mut self`.
         Some(unsafe { self.value.get_mut().assume_init_mut() })
      } else {
         None
      }
   }

   /// # Safety
   ///
   /// The holder must be present.
   #[inline]
   unsafe fn get_unchecked(&self) -> &T {
      debug_assert!(self.is_present(), "get_unchecked called on absent Holder");
      (*self.value.get()).assume_init_ref()
   }

   /// Returns the instance, constructing it with `f` on the first call.
   ///
   /// Concurrent first calls run exactly one `f`; the rest block until it is
   /// published and then return the same reference.
   ///
   /// # Panics
   ///
   /// If `f` re-enters this holder on the same thread, or the holder is poisoned.
   /// If `f` panics the panic propagates and the holder follows its policy.
   #[inline]
   pub fn get_or_init<F>(&self, f: F) -> &T
   where
      F: FnOnce() -> T,
   {
      if let Some(value) = self.get() {
         return value;
      }
      match self.try_get_or_init(f) {
         Ok(value) => value,
         Err(err) => panic!("{err} (`{}`)", type_name::<T>()),
      }
   }

   /// Like [`get_or_init`](Self::get_or_init) but reports reentrancy and poisoning
   /// as errors instead of panicking.
   #[inline]
   pub fn try_get_or_init<F>(&self, f: F) -> Result<&T, SingletonError<Infallible>>
   where
      F: FnOnce() -> T,
   {
      self.get_or_try_init(|| Ok(f()))
   }

   /// Returns the instance, constructing it with the fallible `f` on the first call.
   ///
   /// - If present, returns `Ok(&value)` without locking.
   /// - Otherwise takes the construction lock and re-checks. If this caller runs
   ///   `f` and it fails, returns [`SingletonError::ConstructionFailed`] and the
   ///   holder goes back to `Absent` or becomes `Poisoned` per its policy.
   /// - Callers waiting on a failed attempt retry it themselves under
   ///   [`FailurePolicy::Retry`] and get [`SingletonError::Poisoned`] under
   ///   [`FailurePolicy::Poison`].
   /// - A call from inside `f` on the same thread returns
   ///   [`SingletonError::Reentrant`] instead of deadlocking.
   pub fn get_or_try_init<F, E>(&self, f: F) -> Result<&T, SingletonError<E>>
   where
      F: FnOnce() -> Result<T, E>,
   {
      if let Some(value) = self.get() {
         return Ok(value);
      }
      self.try_initialize(f)?;
      debug_assert!(self.is_present());
      // SAFETY: try_initialize only returns Ok once the holder is present.
      Ok(unsafe { self.get_unchecked() })
   }

   /// Async version of [`get_or_init`](Self::get_or_init).
   ///
   /// While the constructor future is being polled its thread counts as the
   /// constructing thread, so calling back into this holder from it (sync or
   /// async) is detected. A *different* task that calls the blocking accessors
   /// while this construction is suspended parks its thread; on a current-thread
   /// runtime that stalls the constructor for good. Use the async accessors from
   /// async code.
   ///
   /// # Panics
   ///
   /// If the holder is poisoned, or `f`'s future re-enters this holder.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn get_or_init_async<F, Fut>(&self, f: F) -> &T
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = T>,
   {
      if let Some(value) = self.get() {
         return value;
      }
      let init = move || async move { Ok::<T, Infallible>(f().await) };
      match self.get_or_try_init_async(init).await {
         Ok(value) => value,
         Err(err) => panic!("{err} (`{}`)", type_name::<T>()),
      }
   }

   /// Async version of [`get_or_try_init`](Self::get_or_try_init).
   ///
   /// Dropping the returned future while it constructs counts as a failed
   /// construction for the holder's policy. Reentrancy from `f`'s future is
   /// reported as [`SingletonError::Reentrant`]. The same hazard as in
   /// [`get_or_init_async`](Self::get_or_init_async) applies to blocking callers
   /// on other tasks.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn get_or_try_init_async<F, Fut, E>(&self, f: F) -> Result<&T, SingletonError<E>>
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = Result<T, E>>,
   {
      if let Some(value) = self.get() {
         return Ok(value);
      }
      self.try_initialize_async(f).await?;
      debug_assert!(self.is_present());
      // SAFETY: try_initialize_async only returns Ok once the holder is present.
      Ok(unsafe { self.get_unchecked() })
   }

   /// Takes the instance out, leaving the holder absent.
   ///
   /// Exclusive access guarantees no outstanding shared references. Also clears
   /// a poisoned holder.
   pub fn take(&mut self) -> Option<T> {
      if self.lock.set_absent() {
         // SAFETY: It was present and is now absent, so the value is read exactly once.
         Some(unsafe { self.value.get_mut().assume_init_read() })
      } else {
         None
      }
   }

   /// Consumes the holder, returning the instance if present.
   #[inline]
   pub fn into_inner(mut self) -> Option<T> {
      self.take()
   }

   // --- Slow paths ---

   #[cold]
   fn try_initialize<F, E>(&self, f: F) -> Result<(), SingletonError<E>>
   where
      F: FnOnce() -> Result<T, E>,
   {
      let guard = match self.lock.lock(self.policy) {
         Ok(Some(guard)) => guard,
         // Published by another thread while we waited.
         Ok(None) => return Ok(()),
         Err(err) => {
            let err = err.into_error();
            if matches!(err, SingletonError::Reentrant) {
               log::error!("`{}` accessor re-entered from its own constructor", type_name::<T>());
            }
            return Err(err);
         }
      };

      log::debug!("constructing singleton `{}`", type_name::<T>());
      let value = match f() {
         Ok(value) => value,
         Err(err) => {
            self.log_failure();
            drop(guard);
            return Err(SingletonError::ConstructionFailed(err));
         }
      };
      // SAFETY: We hold the construction lock; nobody reads the slot until commit.
      unsafe { (*self.value.get()).write(value) };
      guard.commit();
      log::debug!("published singleton `{}`", type_name::<T>());
      Ok(())
   }

   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   #[cold]
   async fn try_initialize_async<F, Fut, E>(&self, f: F) -> Result<(), SingletonError<E>>
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = Result<T, E>>,
   {
      let guard = match self.lock.lock_async(self.policy).await {
         Ok(Some(guard)) => guard,
         Ok(None) => return Ok(()),
         Err(err) => {
            let err = err.into_error();
            if matches!(err, SingletonError::Reentrant) {
               log::error!("`{}` accessor re-entered from its own constructor", type_name::<T>());
            }
            return Err(err);
         }
      };

      log::debug!("constructing singleton `{}` asynchronously", type_name::<T>());
      let mut construct = pin!(f());
      let result = poll_fn(|cx| guard.poll_as_owner(construct.as_mut(), cx)).await;
      let value = match result {
         Ok(value) => value,
         Err(err) => {
            self.log_failure();
            drop(guard);
            return Err(SingletonError::ConstructionFailed(err));
         }
      };
      // SAFETY: We hold the construction lock; nobody reads the slot until commit.
      unsafe { (*self.value.get()).write(value) };
      guard.commit();
      log::debug!("published singleton `{}`", type_name::<T>());
      Ok(())
   }

   fn log_failure(&self) {
      match self.policy {
         FailurePolicy::Retry => {
            log::warn!("construction of `{}` failed, holder reset", type_name::<T>());
         }
         FailurePolicy::Poison => {
            log::warn!("construction of `{}` failed, holder poisoned", type_name::<T>());
         }
      }
   }
}

// SAFETY: Shared access hands out `&T` to many threads (needs `T: Sync`) and the
// value may be constructed on one thread and dropped on another (needs `T: Send`).
unsafe impl<T: Sync + Send> Sync for Holder<T> {}
// SAFETY: Moving the holder moves the value.
unsafe impl<T: Send> Send for Holder<T> {}

impl<T> Default for Holder<T> {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl<T> From<T> for Holder<T> {
   /// Creates a present holder.
   #[inline]
   fn from(value: T) -> Self {
      Self::with_value(value)
   }
}

impl<T: fmt::Debug> fmt::Debug for Holder<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let mut d = f.debug_struct("Holder");
      d.field("state", &self.state());
      match self.get() {
         Some(v) => d.field("value", v),
         None => d.field("value", &format_args!("<absent>")),
      };
      d.field("policy", &self.policy).finish()
   }
}

impl<T> Drop for Holder<T> {
   #[inline]
   fn drop(&mut self) {
      if self.is_present() {
         // SAFETY: Present and exclusively owned; nothing reads it afterwards.
         unsafe { self.value.get_mut().assume_init_drop() };
      }
   }
}
