//! Versioned response cache for offline support.
//!
//! This module provides:
//! - Static and dynamic namespaces addressed by a version tag
//! - Network-first and cache-first fetch strategies
//! - Activation that drops every namespace of other versions

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{CacheNamespaces, CachedResponse, NamespaceInfo};
