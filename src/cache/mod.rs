//! Rendered artifact cache.
//!
//! - **Artifact store**: one file per [`CacheKey`](crate::domain::types::CacheKey)
//!   under a flat cache root, written atomically.
//! - **Key locks**: an in-process lock table that collapses concurrent misses
//!   for the same key into a single render.
//!
//! Entries carry no expiry; they live until the invalidation trigger or an
//! administrative purge removes them.

mod lock;
mod store;

pub use lock::{KeyLockGuard, KeyLocks};
pub use store::{ArtifactStore, ArtifactStoreError};
