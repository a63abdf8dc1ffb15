//! Thread-safe lazy singletons built on double-checked locking.
//!
//! This crate guarantees that a value is constructed at most once per holder, no
//! matter how many threads race on the first access:
//!
//! - [`Holder<T>`]: the value slot plus its construction guard. The accessors
//!   take a constructor closure.
//! - [`Lazy<T>`] / [`TryLazy<T, E>`]: a holder bound to a constructor fixed at
//!   definition time, reached through `get_instance()`.
//! - [`Eager<T>`]: the instance is built in a constant initializer instead.
//!
//! # How it works
//!
//! - **Lock-free fast path**: once published, reading the instance is a single
//!   `Acquire` load. No lock is taken.
//! - **Double check under the guard**: threads that saw the holder absent race for
//!   the construction lock and re-check before constructing, so exactly one
//!   constructor runs. Losers park on a futex (`parking_lot_core`) until the
//!   winner publishes with `Release` ordering.
//! - **Fallible construction**: a failing constructor returns
//!   [`SingletonError::ConstructionFailed`] to the caller that ran it. The holder
//!   then follows its [`FailurePolicy`]: back to absent so a later call retries
//!   (the default), or poisoned for good.
//! - **Reentrancy detection**: a constructor that calls its own accessor on the
//!   same thread gets [`SingletonError::Reentrant`] rather than a deadlock.
//! - **Async support**: `*_async` accessors for async constructors behind the
//!   `async-tokio` / `async-tokio-mt` features.
//!
//! Construction events are reported through the [`log`] facade.
//!
//! # Examples
//!
//! ```rust
//! use lazy_singleton::{HolderState, Lazy};
//!
//! pub struct Counter {
//!     n: std::sync::atomic::AtomicU64,
//! }
//!
//! static COUNTER: Lazy<Counter> = Lazy::new(|| Counter {
//!     n: std::sync::atomic::AtomicU64::new(0),
//! });
//!
//! assert_eq!(COUNTER.state(), HolderState::Absent);
//! COUNTER.get_instance().n.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//! assert_eq!(COUNTER.n.load(std::sync::atomic::Ordering::Relaxed), 1);
//! assert_eq!(COUNTER.state(), HolderState::Present);
//! ```
//!
//! ## Fallible construction
//!
//! ```rust
//! use lazy_singleton::{SingletonError, TryLazy};
//!
//! static PORT: TryLazy<u16, std::num::ParseIntError> = TryLazy::new(|| "8080".parse());
//!
//! assert_eq!(PORT.get_instance(), Ok(&8080));
//!
//! let holder = lazy_singleton::Holder::<u16>::new();
//! let err = holder.get_or_try_init(|| "nope".parse::<u16>()).unwrap_err();
//! assert!(matches!(err, SingletonError::ConstructionFailed(_)));
//! assert!(holder.get().is_none());
//! ```

/// Eagerly constructed singletons.
mod eager;

/// Accessor errors.
mod error;

/// Holder state slot and double-checked accessors.
mod holder;

/// Singletons with a fixed constructor.
mod lazy;

/// Failure policy configuration.
mod policy;

/// Internal synchronization state management.
mod state;

pub use eager::Eager;
pub use error::SingletonError;
pub use holder::Holder;
pub use lazy::{Lazy, TryLazy};
pub use policy::FailurePolicy;
pub use state::HolderState;
