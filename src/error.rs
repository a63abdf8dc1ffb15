//! Errors reported by singleton accessors.

use thiserror::Error;

/// Failure of a singleton accessor.
///
/// `E` is the error type of the construction procedure. Infallible accessors use
/// [`core::convert::Infallible`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SingletonError<E> {
   /// The constructor ran on this call and failed.
   #[error("singleton construction failed: {0}")]
   ConstructionFailed(E),

   /// The constructor called back into its own accessor before finishing.
   #[error("singleton accessor re-entered from its own constructor")]
   Reentrant,

   /// An earlier construction failed and the holder does not retry.
   #[error("singleton holder is poisoned by an earlier failed construction")]
   Poisoned,
}

impl<E> SingletonError<E> {
   /// Returns the constructor's error, if that is what this is.
   pub fn into_construction_error(self) -> Option<E> {
      match self {
         Self::ConstructionFailed(err) => Some(err),
         Self::Reentrant | Self::Poisoned => None,
      }
   }

   /// Returns `true` for [`SingletonError::ConstructionFailed`].
   pub fn is_construction_failure(&self) -> bool {
      matches!(self, Self::ConstructionFailed(_))
   }
}
