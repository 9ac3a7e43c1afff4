//! In-memory block store
//!
//! A thread-safe [`Storage`] that keeps every block in a sorted map. Listings
//! are produced in identifier order. Call counters make backend traffic
//! observable, which is what the cache tests rely on.

use super::{BlockInfo, BlockListing, Storage};
use crate::{error::StorageError, range::slice_range};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

#[derive(Debug, Clone)]
struct StoredBlock {
    data: Bytes,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CallCounters {
    gets: AtomicU64,
    puts: AtomicU64,
    lists: AtomicU64,
    cancels: AtomicU64,
}

/// Block store backed by a `BTreeMap`
#[derive(Debug, Default)]
pub struct MemoryStorage {
    blocks: RwLock<BTreeMap<String, StoredBlock>>,
    counters: Arc<CallCounters>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block with an explicit timestamp, bypassing call counting.
    pub fn insert(&self, id: impl Into<String>, data: impl Into<Bytes>, timestamp: DateTime<Utc>) {
        self.blocks.write().insert(
            id.into(),
            StoredBlock {
                data: data.into(),
                timestamp,
            },
        );
    }

    /// Make subsequent `put_block` calls fail with a backend error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_block` calls served
    pub fn get_calls(&self) -> u64 {
        self.counters.gets.load(Ordering::SeqCst)
    }

    /// Number of `put_block` calls, including rejected ones
    pub fn put_calls(&self) -> u64 {
        self.counters.puts.load(Ordering::SeqCst)
    }

    /// Number of listings started
    pub fn list_calls(&self) -> u64 {
        self.counters.lists.load(Ordering::SeqCst)
    }

    /// Number of listings whose cancel function has run
    pub fn cancel_calls(&self) -> u64 {
        self.counters.cancels.load(Ordering::SeqCst)
    }

    /// Number of stored blocks
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// Whether the store holds no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_block(&self, id: &str, offset: u64, length: Option<u64>) -> Result<Bytes, StorageError> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);

        let data = self
            .blocks
            .read()
            .get(id)
            .map(|block| block.data.clone())
            .ok_or_else(|| StorageError::BlockNotFound(id.to_string()))?;

        let window = slice_range(&data, offset, length)?;
        Ok(data.slice_ref(window))
    }

    fn put_block(&self, id: &str, data: &[u8]) -> Result<(), StorageError> {
        self.counters.puts.fetch_add(1, Ordering::SeqCst);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("write of {id} rejected")));
        }

        self.insert(id, Bytes::copy_from_slice(data), Utc::now());
        Ok(())
    }

    fn list_blocks(&self, prefix: &str) -> BlockListing {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);

        let entries: Vec<_> = self
            .blocks
            .read()
            .range(prefix.to_string()..)
            .take_while(|(id, _)| id.starts_with(prefix))
            .map(|(id, block)| {
                Ok::<_, StorageError>(BlockInfo::new(
                    id.clone(),
                    block.data.len() as u64,
                    block.timestamp,
                ))
            })
            .collect();

        let counters = Arc::clone(&self.counters);
        BlockListing::new(entries, move || {
            counters.cancels.fetch_add(1, Ordering::SeqCst);
        })
    }
}
