//! Remote block store interface
//!
//! The cache reads through a [`Storage`] implementation and never talks to
//! the network itself. Transport, retries and authentication belong to the
//! backend.

pub mod memory;

pub use memory::MemoryStorage;

use crate::error::StorageError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prefix shared by all index block identifiers
pub const INDEX_BLOCK_PREFIX: &str = "n";

/// Suffix marking an index block produced by compaction
pub const COMPACTED_BLOCK_SUFFIX: &str = "-z";

/// Metadata for one block as known to the backend
///
/// The field names follow the on-disk listing snapshot format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Backend identifier of the block
    #[serde(rename = "BlockID")]
    pub block_id: String,
    /// Stored length in bytes
    #[serde(rename = "Length")]
    pub length: u64,
    /// When the backend recorded the block
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl BlockInfo {
    /// Create block metadata
    pub fn new(block_id: impl Into<String>, length: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            block_id: block_id.into(),
            length,
            timestamp,
        }
    }
}

type ListingEntries = Box<dyn Iterator<Item = Result<BlockInfo, StorageError>> + Send>;
type CancelFn = Box<dyn FnOnce() + Send>;

/// A lazily produced, cancelable block listing
///
/// The cancel function releases whatever the backend holds open for the
/// listing. It runs exactly once: either through [`cancel`](Self::cancel)
/// or when the listing is dropped, so a scan that stops early, fails, or
/// runs to exhaustion always releases it.
pub struct BlockListing {
    entries: ListingEntries,
    cancel: Option<CancelFn>,
}

impl BlockListing {
    /// Wrap a lazy entry sequence together with its cancel function.
    pub fn new<I, F>(entries: I, cancel: F) -> Self
    where
        I: IntoIterator<Item = Result<BlockInfo, StorageError>>,
        I::IntoIter: Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        Self {
            entries: Box::new(entries.into_iter()),
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A listing that holds no backend resources.
    pub fn without_cancel<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = Result<BlockInfo, StorageError>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            entries: Box::new(entries.into_iter()),
            cancel: None,
        }
    }

    /// Stop the listing and release backend resources.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Iterator for BlockListing {
    type Item = Result<BlockInfo, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

impl Drop for BlockListing {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BlockListing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockListing")
            .field("cancelable", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

/// Remote block store collaborator
///
/// Calls block the calling thread for the duration of the backend I/O.
pub trait Storage: Send + Sync {
    /// Read `length` bytes starting at `offset`; `None` reads to the end.
    ///
    /// Returns [`StorageError::BlockNotFound`] for a missing block.
    fn get_block(&self, id: &str, offset: u64, length: Option<u64>) -> Result<Bytes, StorageError>;

    /// Store `data` under `id`, replacing any previous content.
    fn put_block(&self, id: &str, data: &[u8]) -> Result<(), StorageError>;

    /// List all blocks whose identifier starts with `prefix`.
    fn list_blocks(&self, prefix: &str) -> BlockListing;
}

impl<T: Storage + ?Sized> Storage for Arc<T> {
    fn get_block(&self, id: &str, offset: u64, length: Option<u64>) -> Result<Bytes, StorageError> {
        (**self).get_block(id, offset, length)
    }

    fn put_block(&self, id: &str, data: &[u8]) -> Result<(), StorageError> {
        (**self).put_block(id, data)
    }

    fn list_blocks(&self, prefix: &str) -> BlockListing {
        (**self).list_blocks(prefix)
    }
}

/// Identifier of a compacted index block written at `timestamp`.
///
/// Returns `None` when the timestamp does not fit in `i64` nanoseconds since
/// the epoch (before 1677 or after 2262).
pub fn compacted_block_id(timestamp: DateTime<Utc>) -> Option<String> {
    let nanos = timestamp.timestamp_nanos_opt()?;
    Some(format!("{INDEX_BLOCK_PREFIX}{nanos:x}{COMPACTED_BLOCK_SUFFIX}"))
}

/// Decode the compaction timestamp from a compacted index block identifier.
///
/// Returns `None` for any identifier that does not follow the
/// `n<hex-nanoseconds>-z` convention.
pub fn compacted_timestamp(block_id: &str) -> Option<DateTime<Utc>> {
    let hex = block_id
        .strip_prefix(INDEX_BLOCK_PREFIX)?
        .strip_suffix(COMPACTED_BLOCK_SUFFIX)?;
    let nanos = i64::from_str_radix(hex, 16).ok()?;
    Some(DateTime::from_timestamp_nanos(nanos))
}
