//! What a holder does after a failed construction.

/// Behaviour of a holder whose constructor returned an error, panicked, or (for the
/// async accessors) was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FailurePolicy {
   /// Return to `Absent`. The next accessor call runs the constructor again, and
   /// threads that were waiting on the failed attempt retry transparently.
   #[default]
   Retry,
   /// Move to `Poisoned`. Every later call, including the waiting ones, fails with
   /// [`SingletonError::Poisoned`](crate::SingletonError::Poisoned).
   Poison,
}
