//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyRequest
//!     → key.rs (method + effective URL [+ POST fields] → SHA-256 key)
//!     → store.rs (exists / get / put / delete / list)
//!     → entry.rs (metadata line + raw response blob)
//!
//! Concurrent misses on one key:
//!     → singleflight.rs (one fetch, others wait then read the stored entry)
//! ```
//!
//! # Design Decisions
//! - Entries are written whole and never mutated; a re-fetch overwrites
//! - Store failures surface as `CacheError` and the engine treats them as a
//!   miss, so a broken backend never stops the accept loop

pub mod entry;
pub mod key;
pub mod singleflight;
pub mod store;

use std::path::Path;
use std::sync::Arc;

pub use entry::CacheEntry;
pub use key::{cache_key, post_cache_key, raw_body_cache_key, CacheKeyer};
pub use singleflight::KeyLocks;
pub use store::{CacheStore, FileStore, MemoryStore};

use crate::config::{CacheBackend, CacheConfig};

/// Error type for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no cache entry for key `{0}`")]
    NotFound(String),

    #[error("invalid cache key `{0}`")]
    InvalidKey(String),

    #[error("corrupt cache entry: {0}")]
    Corrupt(String),

    #[error("cannot encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Build the store selected by `config`.
pub fn open_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config.backend {
        CacheBackend::Filesystem => Ok(Arc::new(FileStore::open(Path::new(&config.root))?)),
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
