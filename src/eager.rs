//! Eagerly constructed singletons.
//!
//! The instance is built in a constant initializer, so it exists before any code
//! runs and needs no guard. This is the variant to reach for when the
//! constructor has no side effects worth deferring.
//!
//! ```rust
//! use lazy_singleton::Eager;
//!
//! pub struct Limits {
//!     max_connections: u32,
//! }
//!
//! static LIMITS: Eager<Limits> = Eager::new(Limits { max_connections: 64 });
//!
//! assert_eq!(LIMITS.get_instance().max_connections, 64);
//! ```

use core::fmt;
use core::ops::Deref;

/// A singleton whose instance is created together with its holder.
pub struct Eager<T> {
   value: T,
}

impl<T> Eager<T> {
   /// Creates the singleton around an already constructed `value`.
   #[inline]
   #[must_use]
   pub const fn new(value: T) -> Self {
      Self { value }
   }

   /// Returns the shared instance. Never blocks.
   #[inline]
   pub const fn get_instance(&self) -> &T {
      &self.value
   }
}

impl<T> Deref for Eager<T> {
   type Target = T;

   #[inline]
   fn deref(&self) -> &T {
      &self.value
   }
}

impl<T: fmt::Debug> fmt::Debug for Eager<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_tuple("Eager").field(&self.value).finish()
   }
}
