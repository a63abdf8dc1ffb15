//! Internal synchronization state for singleton holders.
//!
//! The holder state is packed into a single `AtomicU8`:
//! - Bit 0: PRESENT - The instance has been constructed and published
//! - Bit 1: LOCKED - A thread is inside the construction critical section
//! - Bit 2: WAITING - At least one thread is parked on the holder
//! - Bit 3: POISONED - A construction failed under [`FailurePolicy::Poison`]
//! - Bits 4-7: EPOCH - Generation counter bumped on every release
//!
//! Readers of a present holder only perform an `Acquire` load. Threads that lose
//! the race for the critical section park on the state address via
//! `parking_lot_core` and are woken when the holder leaves `Constructing`.
//!
//! The thread running the constructor is recorded by a per-thread token so that
//! an acquisition from inside its own constructor is reported instead of parking
//! forever. Async constructors are recorded only while they are being polled.

use core::fmt;
use core::mem;
#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
use core::{
   future::Future,
   pin::Pin,
   task::{Context, Poll},
};
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

use crate::error::SingletonError;
use crate::policy::FailurePolicy;

/// Observable lifecycle of a singleton holder.
///
/// `Absent -> Constructing -> Present` is the only successful path. A failed
/// construction returns to `Absent` under [`FailurePolicy::Retry`] and moves to
/// `Poisoned` under [`FailurePolicy::Poison`]. `Present` and `Poisoned` are terminal
/// for shared access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HolderState {
   /// No instance yet; the next accessor call constructs one.
   Absent,
   /// A thread is running the constructor.
   Constructing,
   /// The instance is published and will never change.
   Present,
   /// An earlier construction failed and the holder refuses further attempts.
   Poisoned,
}

impl fmt::Display for HolderState {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::Absent => "absent",
         Self::Constructing => "constructing",
         Self::Present => "present",
         Self::Poisoned => "poisoned",
      })
   }
}

/// Reasons a blocking acquisition could not hand out the construction guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockError {
   /// The calling thread already holds the guard.
   Reentrant,
   /// The holder was poisoned by a failed construction.
   Poisoned,
}

impl LockError {
   pub(crate) fn into_error<E>(self) -> SingletonError<E> {
      match self {
         Self::Reentrant => SingletonError::Reentrant,
         Self::Poisoned => SingletonError::Poisoned,
      }
   }
}

/// Outcome of a single non-parking acquisition attempt.
enum Step {
   /// The lock is held by someone else; carries the state that was observed.
   Busy(u8),
   Reentrant,
   Poisoned,
}

/// Returns an address unique to the calling thread for as long as it lives.
#[inline]
fn thread_token() -> usize {
   thread_local! {
      static TOKEN: u8 = const { 0 };
   }
   TOKEN.with(|token| token as *const u8 as usize)
}

/// Atomic state of a singleton holder.
pub(crate) struct HolderLock {
   state: AtomicU8,
   /// Token of the thread currently constructing, or 0.
   owner: AtomicUsize,
}

impl HolderLock {
   const PRESENT: u8 = 1;
   const LOCKED: u8 = 2;
   const WAITING: u8 = 4;
   const POISONED: u8 = 8;
   const EPOCH_1: u8 = 16;
   const EPOCH_MASK: u8 = !(Self::PRESENT | Self::LOCKED | Self::WAITING | Self::POISONED);

   #[inline(always)]
   const fn next_epoch(current_state: u8) -> u8 {
      (current_state & Self::EPOCH_MASK).wrapping_add(Self::EPOCH_1) & Self::EPOCH_MASK
   }

   /// Creates a lock in the `Absent` state.
   #[inline]
   pub(crate) const fn new() -> Self {
      Self {
         state: AtomicU8::new(0),
         owner: AtomicUsize::new(0),
      }
   }

   /// Creates a lock in the `Present` state.
   #[inline]
   pub(crate) const fn present() -> Self {
      Self {
         state: AtomicU8::new(Self::PRESENT),
         owner: AtomicUsize::new(0),
      }
   }

   #[inline]
   fn park_key(&self) -> usize {
      self.state.as_ptr() as usize
   }

   #[inline]
   fn notify_all(&self) {
      // SAFETY: The key is the address of `self.state`, the same key used by `wait`.
      unsafe {
         parking_lot_core::unpark_all(self.park_key(), DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the calling thread until the state differs from `expected_state`.
   ///
   /// Wakeups may be spurious; callers re-check the state in a loop.
   #[inline]
   fn wait(&self, expected_state: u8) {
      // SAFETY: See `notify_all`. The validate closure runs under the bucket lock
      // so a concurrent `notify_all` cannot be missed.
      unsafe {
         let _ = parking_lot_core::park(
            self.park_key(),
            || self.state.load(Ordering::Acquire) == expected_state,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Swaps in `flags` with a fresh epoch and wakes any parked threads.
   /// Returns the previous state.
   #[inline]
   fn release_to(&self, flags: u8) -> u8 {
      let current_state = self.state.load(Ordering::Relaxed);
      let new_state = flags | Self::next_epoch(current_state);

      // Release pairs with the Acquire loads in `is_present` and `lock_step`, so a
      // reader that observes PRESENT also observes the fully written value.
      let prev_state = self.state.swap(new_state, Ordering::Release);
      if prev_state & Self::WAITING != 0 {
         self.notify_all();
      }
      prev_state
   }

   /// Publishes the value. Returns `true` if the holder was not present before.
   #[inline]
   pub(crate) fn set_present(&self) -> bool {
      self.release_to(Self::PRESENT) & Self::PRESENT == 0
   }

   /// Returns the holder to `Absent`. Returns `true` if it was present before.
   #[inline]
   pub(crate) fn set_absent(&self) -> bool {
      self.release_to(0) & Self::PRESENT != 0
   }

   #[inline]
   fn set_poisoned(&self) {
      self.release_to(Self::POISONED);
   }

   /// Checks if the value has been published.
   #[inline]
   pub(crate) fn is_present(&self) -> bool {
      self.state.load(Ordering::Acquire) & Self::PRESENT != 0
   }

   /// Decodes the current state.
   pub(crate) fn state(&self) -> HolderState {
      let state = self.state.load(Ordering::Acquire);
      if state & Self::PRESENT != 0 {
         HolderState::Present
      } else if state & Self::POISONED != 0 {
         HolderState::Poisoned
      } else if state & Self::LOCKED != 0 {
         HolderState::Constructing
      } else {
         HolderState::Absent
      }
   }

   /// One acquisition attempt.
   ///
   /// - `Ok(None)`: the holder is present.
   /// - `Ok(Some(guard))`: the lock was taken; the holder is now `Constructing`.
   /// - `Err(step)`: the lock is held elsewhere, held by this thread, or poisoned.
   ///
   /// An attempt by the thread currently running the constructor is reported as
   /// `Step::Reentrant`. With `record_owner` the calling thread is recorded on
   /// success. The async path skips that because a task can hop threads across
   /// await points; its guard records the owner around each poll instead.
   fn lock_step(
      &self,
      policy: FailurePolicy,
      record_owner: bool,
   ) -> Result<Option<HolderGuard<'_>>, Step> {
      loop {
         let current_state = self.state.load(Ordering::Acquire);
         if current_state & Self::PRESENT != 0 {
            return Ok(None);
         }
         if current_state & Self::POISONED != 0 {
            return Err(Step::Poisoned);
         }

         if current_state & Self::LOCKED == 0 {
            match self.state.compare_exchange_weak(
               current_state,
               current_state | Self::LOCKED,
               Ordering::Acquire,
               Ordering::Relaxed,
            ) {
               Ok(_) => {
                  if record_owner {
                     self.owner.store(thread_token(), Ordering::Relaxed);
                  }
                  return Ok(Some(HolderGuard::new(self, policy)));
               }
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }

         // Only this thread ever stores its own token, so a match cannot be stale.
         if self.owner.load(Ordering::Relaxed) == thread_token() {
            return Err(Step::Reentrant);
         }

         if current_state & Self::WAITING == 0 {
            let new_state = current_state | Self::WAITING;
            match self.state.compare_exchange_weak(
               current_state,
               new_state,
               Ordering::Relaxed,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Err(Step::Busy(new_state)),
               Err(_) => {
                  std::hint::spin_loop();
                  continue;
               }
            }
         }
         return Err(Step::Busy(current_state));
      }
   }

   /// Acquires the construction lock, parking while another thread constructs.
   ///
   /// Returns `Ok(None)` once the holder is present.
   pub(crate) fn lock(&self, policy: FailurePolicy) -> Result<Option<HolderGuard<'_>>, LockError> {
      let mut observed = match self.lock_step(policy, true) {
         Ok(guard) => return Ok(guard),
         Err(Step::Busy(state)) => state,
         Err(Step::Reentrant) => return Err(LockError::Reentrant),
         Err(Step::Poisoned) => return Err(LockError::Poisoned),
      };
      loop {
         self.wait(observed);
         match self.lock_step(policy, true) {
            Ok(guard) => return Ok(guard),
            Err(Step::Busy(state)) => observed = state,
            Err(Step::Reentrant) => return Err(LockError::Reentrant),
            Err(Step::Poisoned) => return Err(LockError::Poisoned),
         }
      }
   }

   /// Acquires the construction lock from async code.
   ///
   /// Yields to the runtime while the lock is busy. On the multi-threaded runtime
   /// it falls back to parking inside `block_in_place`; on a current-thread runtime
   /// it keeps yielding, since parking there would stall the constructing task.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn lock_async(
      &self,
      policy: FailurePolicy,
   ) -> Result<Option<HolderGuard<'_>>, LockError> {
      loop {
         for _ in 0..16 {
            match self.lock_step(policy, false) {
               Ok(guard) => return Ok(guard),
               Err(Step::Poisoned) => return Err(LockError::Poisoned),
               Err(Step::Reentrant) => return Err(LockError::Reentrant),
               Err(Step::Busy(state)) => {
                  for _ in 0..32 {
                     tokio::task::yield_now().await;
                     if self.state.load(Ordering::Relaxed) != state {
                        break;
                     }
                  }
               }
            }
         }

         #[cfg(feature = "async-tokio-mt")]
         if can_block_in_place() {
            return match self.lock_step(policy, false) {
               Ok(guard) => Ok(guard),
               Err(Step::Poisoned) => Err(LockError::Poisoned),
               Err(Step::Reentrant) => Err(LockError::Reentrant),
               Err(Step::Busy(state)) => tokio::task::block_in_place(|| {
                  self.wait(state);
                  self.lock_unrecorded(policy)
               }),
            };
         }
      }
   }

   /// Blocking acquisition that does not record an owner, used by the async fallback.
   #[cfg(feature = "async-tokio-mt")]
   fn lock_unrecorded(&self, policy: FailurePolicy) -> Result<Option<HolderGuard<'_>>, LockError> {
      loop {
         match self.lock_step(policy, false) {
            Ok(guard) => return Ok(guard),
            Err(Step::Busy(state)) => self.wait(state),
            Err(Step::Poisoned) => return Err(LockError::Poisoned),
            Err(Step::Reentrant) => return Err(LockError::Reentrant),
         }
      }
   }
}

/// Whether the current task runs on a multi-threaded tokio runtime, where
/// `block_in_place` is allowed.
#[cfg(feature = "async-tokio-mt")]
fn can_block_in_place() -> bool {
   use tokio::runtime::{Handle, RuntimeFlavor};

   Handle::try_current()
      .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
      .unwrap_or(false)
}

/// RAII guard for the construction critical section.
///
/// Must be [`commit`](HolderGuard::commit)ted after the value is written. If it is
/// dropped instead (constructor error, panic, or a cancelled future) the holder
/// returns to `Absent` or becomes `Poisoned`, depending on the policy.
pub(crate) struct HolderGuard<'a> {
   lock: &'a HolderLock,
   policy: FailurePolicy,
}

impl<'a> HolderGuard<'a> {
   #[inline(always)]
   const fn new(lock: &'a HolderLock, policy: FailurePolicy) -> Self {
      Self { lock, policy }
   }

   /// Marks the holder present, consumes the guard and wakes waiters.
   #[inline]
   pub(crate) fn commit(self) -> bool {
      self.lock.owner.store(0, Ordering::Relaxed);
      let published = self.lock.set_present();
      mem::forget(self);
      published
   }

   /// Polls the constructor future with the current thread recorded as owner, so
   /// that the constructor calling back into its own holder is reported as
   /// reentrant rather than waiting on itself.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) fn poll_as_owner<F: Future>(
      &self,
      construct: Pin<&mut F>,
      cx: &mut Context<'_>,
   ) -> Poll<F::Output> {
      self.lock.owner.store(thread_token(), Ordering::Relaxed);
      let poll = construct.poll(cx);
      self.lock.owner.store(0, Ordering::Relaxed);
      poll
   }
}

impl Drop for HolderGuard<'_> {
   fn drop(&mut self) {
      self.lock.owner.store(0, Ordering::Relaxed);
      match self.policy {
         FailurePolicy::Retry => {
            self.lock.set_absent();
         }
         FailurePolicy::Poison => self.lock.set_poisoned(),
      }
   }
}
