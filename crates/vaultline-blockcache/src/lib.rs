//! Integrity-verified local cache for a remote block store
//!
//! This crate mirrors blocks and index-block listings fetched from a
//! content-addressed backend into a single local directory:
//!
//! - **Blocks** are cached whole under their virtual key and served without
//!   touching the backend once present.
//! - **Listings** of index blocks are cached under two reserved keys and
//!   served for a bounded freshness window.
//! - **Integrity**: every file carries an HMAC-SHA256 tag under a per-cache
//!   secret; files that fail verification are treated as misses.
//! - **Eviction**: a background thread keeps the directory within a size
//!   budget by deleting the least recently written files.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vaultline_blockcache::{DiskBlockCache, DiskBlockCacheConfig, MemoryStorage};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = std::env::temp_dir().join("vaultline-doc-example");
//! let storage = Arc::new(MemoryStorage::new());
//! let config = DiskBlockCacheConfig::new(&dir)
//!     .with_max_size_bytes(256 * 1024 * 1024)
//!     .with_list_cache_duration(Duration::from_secs(600))
//!     .with_hmac_secret(b"local-secret".to_vec());
//!
//! let mut cache = DiskBlockCache::new(Arc::clone(&storage), config)?;
//! cache.put_block("p0123", b"block contents")?;
//!
//! // Served from the local file; the backend is not consulted.
//! let data = cache.get_block("p0123", "p0123", 0, None)?;
//! assert_eq!(&data[..], b"block contents");
//!
//! cache.close();
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]
#![allow(clippy::return_self_not_must_use)] // Builder patterns

pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod integrity;
pub mod range;
pub mod stats;
pub mod storage;
pub mod sweep;

/// File name suffix of every cache file, temporary files included
pub const CACHED_SUFFIX: &str = ".cached";

pub use cache::{DiskBlockCache, LIST_ACTIVE_KEY, LIST_FULL_KEY, SWEEP_INTERVAL};
pub use config::DiskBlockCacheConfig;
pub use error::{CacheError, CacheResult, IntegrityError, RangeError, StorageError};
pub use integrity::{IntegrityKey, TAG_LEN};
pub use range::slice_range;
pub use stats::{CacheMetrics, CacheMetricsSnapshot};
pub use storage::{
    BlockInfo, BlockListing, COMPACTED_BLOCK_SUFFIX, INDEX_BLOCK_PREFIX, MemoryStorage, Storage,
    compacted_block_id, compacted_timestamp,
};
pub use sweep::{CacheDirectoryEntry, SweepOutcome};
