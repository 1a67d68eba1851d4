//! Identity caching.
//!
//! One [`IdentityCache`] per class guarantees that, while any strong
//! reference to an object is alive, loading its row again yields the same
//! instance.

mod identity;

pub use identity::{CacheStats, IdentityCache};
