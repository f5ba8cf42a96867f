//! Generation-partitioned response cache.
//!
//! This module provides the persistent store behind the worker:
//! - Responses are keyed by request identity (method + URL)
//! - Entries live in named generations whose names carry a version tag
//! - Generations can be listed and deleted wholesale, which is how old
//!   versions are purged on activation

mod generations;
mod memory;
mod storage;
mod traits;

pub use generations::GenerationNames;
pub use memory::MemoryStore;
pub use storage::SqliteStore;
pub use traits::{CacheStore, CachedResponse, RequestIdentity};
