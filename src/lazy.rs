//! Singletons bound to a constructor fixed at definition time.
//!
//! [`Lazy<T>`] and [`TryLazy<T, E>`] pair a [`Holder`] with a zero-argument
//! construction procedure, so the only way to reach the instance is
//! `get_instance()`. Both are `const`-constructible and meant to live in a
//! `static`:
//!
//! ```rust
//! use lazy_singleton::Lazy;
//!
//! pub struct Registry {
//!     entries: Vec<&'static str>,
//! }
//!
//! static REGISTRY: Lazy<Registry> = Lazy::new(|| Registry {
//!     entries: vec!["default"],
//! });
//!
//! assert_eq!(REGISTRY.get_instance().entries, ["default"]);
//! assert!(std::ptr::eq(REGISTRY.get_instance(), &*REGISTRY));
//! ```
//!
//! Keeping the singleton type's fields private to its module makes construction
//! outside the accessor impossible.

use core::convert::Infallible;
use core::fmt;
use core::ops::Deref;

use crate::error::SingletonError;
use crate::holder::Holder;
use crate::policy::FailurePolicy;
use crate::state::HolderState;

/// A lazily constructed singleton with an infallible constructor.
pub struct Lazy<T> {
   holder: Holder<T>,
   init: fn() -> T,
}

impl<T> Lazy<T> {
   /// Creates an absent singleton that runs `init` on first access.
   #[inline]
   #[must_use]
   pub const fn new(init: fn() -> T) -> Self {
      Self {
         holder: Holder::new(),
         init,
      }
   }

   /// Returns the shared instance, constructing it on the first call.
   ///
   /// # Panics
   ///
   /// If the constructor calls back into this accessor.
   #[inline]
   pub fn get_instance(&self) -> &T {
      self.holder.get_or_init(self.init)
   }

   /// Like [`get_instance`](Self::get_instance), but reports a reentrant
   /// constructor as [`SingletonError::Reentrant`].
   #[inline]
   pub fn try_get_instance(&self) -> Result<&T, SingletonError<Infallible>> {
      self.holder.try_get_or_init(self.init)
   }

   /// Returns the instance if it already exists. Never constructs or blocks.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      self.holder.get()
   }

   /// Current lifecycle state. Never blocks.
   #[inline]
   pub fn state(&self) -> HolderState {
      self.holder.state()
   }
}

impl<T> Deref for Lazy<T> {
   type Target = T;

   #[inline]
   fn deref(&self) -> &T {
      self.get_instance()
   }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_tuple("Lazy").field(&self.holder).finish()
   }
}

/// A lazily constructed singleton whose constructor can fail.
///
/// With the default [`FailurePolicy::Retry`] a failed construction leaves the
/// singleton absent and the next `get_instance()` tries again.
pub struct TryLazy<T, E> {
   holder: Holder<T>,
   init: fn() -> Result<T, E>,
}

impl<T, E> TryLazy<T, E> {
   /// Creates an absent singleton that retries after failures.
   #[inline]
   #[must_use]
   pub const fn new(init: fn() -> Result<T, E>) -> Self {
      Self::with_policy(init, FailurePolicy::Retry)
   }

   /// Creates an absent singleton with an explicit failure policy.
   #[inline]
   #[must_use]
   pub const fn with_policy(init: fn() -> Result<T, E>, policy: FailurePolicy) -> Self {
      Self {
         holder: Holder::with_policy(policy),
         init,
      }
   }

   /// Returns the shared instance, constructing it if absent.
   ///
   /// The caller whose construction attempt fails receives
   /// [`SingletonError::ConstructionFailed`].
   #[inline]
   pub fn get_instance(&self) -> Result<&T, SingletonError<E>> {
      self.holder.get_or_try_init(self.init)
   }

   /// Returns the instance if it already exists. Never constructs or blocks.
   #[inline]
   pub fn get(&self) -> Option<&T> {
      self.holder.get()
   }

   /// Current lifecycle state. Never blocks.
   #[inline]
   pub fn state(&self) -> HolderState {
      self.holder.state()
   }

   /// The failure policy this singleton was created with.
   #[inline]
   pub fn policy(&self) -> FailurePolicy {
      self.holder.policy()
   }
}

impl<T: fmt::Debug, E> fmt::Debug for TryLazy<T, E> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_tuple("TryLazy").field(&self.holder).finish()
   }
}
