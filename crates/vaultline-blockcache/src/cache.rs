//! Disk-resident block cache in front of a remote block store
//!
//! Every cached item is a single file `<key>.cached` holding the payload
//! followed by its HMAC tag. Blocks are cached under their virtual key; the
//! two index listings are cached under reserved keys with a freshness window.
//! A background thread sweeps the directory once a minute and evicts the
//! least recently written files when the size budget is exceeded.
//!
//! Local cache faults never fail an operation: they are logged, counted and
//! treated as misses, and the backend stays authoritative.
//!
//! A cache hit returns the whole stored payload without re-applying
//! `offset`/`length`. Each virtual key must therefore always denote the same
//! byte range of the same immutable block.

use crate::{
    CACHED_SUFFIX,
    config::DiskBlockCacheConfig,
    error::{CacheError, CacheResult, StorageError},
    fs::write_file_atomic,
    integrity::IntegrityKey,
    stats::{CacheMetrics, CacheMetricsSnapshot},
    storage::{BlockInfo, INDEX_BLOCK_PREFIX, Storage, compacted_timestamp},
    sweep,
};
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime},
};
use tracing::{debug, trace, warn};

/// Interval between background directory sweeps
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Cache key of the full index listing
pub const LIST_FULL_KEY: &str = "list-full";

/// Cache key of the active index listing
pub const LIST_ACTIVE_KEY: &str = "list-active";

#[derive(Debug, Default)]
struct SweepState {
    last_total_size_bytes: u64,
    closed: bool,
}

/// State shared between the cache and its sweeper thread
#[derive(Debug)]
struct Sweeper {
    directory: PathBuf,
    max_size_bytes: u64,
    state: Mutex<SweepState>,
    metrics: Arc<CacheMetrics>,
}

impl Sweeper {
    fn sweep(&self) -> CacheResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }

        if self.max_size_bytes == 0 {
            return Ok(());
        }

        let started = Instant::now();
        debug!(dir = %self.directory.display(), "sweeping cache");

        let outcome = sweep::sweep_directory(&self.directory, self.max_size_bytes)?;
        state.last_total_size_bytes = outcome.retained_bytes;
        self.metrics.record_sweep(outcome.evicted);

        debug!(
            elapsed = ?started.elapsed(),
            retained = outcome.retained_bytes,
            budget = self.max_size_bytes,
            percent = outcome.retained_bytes.saturating_mul(100) / self.max_size_bytes,
            evicted = outcome.evicted,
            "finished sweeping cache directory"
        );
        Ok(())
    }

    fn run(&self, shutdown: &Receiver<()>, interval: Duration) {
        loop {
            match shutdown.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = self.sweep() {
                        warn!(dir = %self.directory.display(), error = %e, "cache sweep failed");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}

/// Local, integrity-verified mirror of a remote block store
pub struct DiskBlockCache<S: Storage> {
    storage: S,
    directory: PathBuf,
    list_cache_duration: Duration,
    key: IntegrityKey,
    metrics: Arc<CacheMetrics>,
    sweeper: Arc<Sweeper>,
    shutdown: Option<Sender<()>>,
    sweeper_handle: Option<JoinHandle<()>>,
}

impl<S: Storage> DiskBlockCache<S> {
    /// Create a cache in front of `storage` and start the sweeper thread.
    pub fn new(storage: S, config: DiskBlockCacheConfig) -> CacheResult<Self> {
        Self::with_sweep_interval(storage, config, SWEEP_INTERVAL)
    }

    pub(crate) fn with_sweep_interval(
        storage: S,
        config: DiskBlockCacheConfig,
        interval: Duration,
    ) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        let key = IntegrityKey::new(&config.hmac_secret)?;
        let metrics = Arc::new(CacheMetrics::new());
        let sweeper = Arc::new(Sweeper {
            directory: config.cache_dir.clone(),
            max_size_bytes: config.max_size_bytes,
            state: Mutex::new(SweepState::default()),
            metrics: Arc::clone(&metrics),
        });

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let worker = Arc::clone(&sweeper);
        let handle = thread::Builder::new()
            .name("block-cache-sweep".to_string())
            .spawn(move || worker.run(&shutdown_rx, interval))
            .map_err(CacheError::SweeperSpawn)?;

        debug!(
            dir = %config.cache_dir.display(),
            max_size_bytes = config.max_size_bytes,
            list_cache_duration = ?config.list_cache_duration,
            "block cache initialized"
        );

        Ok(Self {
            storage,
            directory: config.cache_dir,
            list_cache_duration: config.list_cache_duration,
            key,
            metrics,
            sweeper,
            shutdown: Some(shutdown_tx),
            sweeper_handle: Some(handle),
        })
    }

    /// The backend this cache reads through
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Directory holding the cache files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the cache file for `key`
    pub fn cached_item_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}{CACHED_SUFFIX}"))
    }

    /// Read a block, preferring the local copy stored under `virtual_key`.
    ///
    /// On a miss the backend is asked for `physical_key` at
    /// `offset`/`length`, and a successful result is mirrored locally.
    pub fn get_block(
        &self,
        virtual_key: &str,
        physical_key: &str,
        offset: u64,
        length: Option<u64>,
    ) -> Result<Bytes, StorageError> {
        let path = self.cached_item_path(virtual_key);

        match fs::read(&path) {
            Ok(blob) => match self.key.verify_owned(blob) {
                Ok(payload) => {
                    trace!(key = virtual_key, "block cache hit");
                    self.metrics.record_block(true);
                    return Ok(Bytes::from(payload));
                }
                Err(e) => {
                    warn!(key = virtual_key, error = %e, "malformed cached block");
                    self.metrics.record_corrupt_entry();
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(file = %path.display(), error = %e, "unable to read cache file"),
        }

        self.metrics.record_block(false);
        let data = self.storage.get_block(physical_key, offset, length)?;
        self.store(&path, &data);
        Ok(data)
    }

    /// Write a block to the backend, then mirror it locally.
    ///
    /// Both listing snapshots are invalidated after a successful write.
    pub fn put_block(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.storage.put_block(key, data)?;

        self.store(&self.cached_item_path(key), data);
        self.delete_list_cache();
        Ok(())
    }

    /// List index blocks, serving a fresh local snapshot when one exists.
    ///
    /// `full` lists every index block; otherwise the listing stops at the
    /// first compacted block.
    pub fn list_index_blocks(&self, full: bool) -> Result<Vec<BlockInfo>, StorageError> {
        let key = if full { LIST_FULL_KEY } else { LIST_ACTIVE_KEY };
        let path = self.cached_item_path(key);

        if let Some(blocks) = self.read_cached_listing(&path) {
            debug!(full, file = %path.display(), "listing index blocks from cache");
            self.metrics.record_list(true);
            return Ok(blocks);
        }

        debug!(full, "listing index blocks from source");
        self.metrics.record_list(false);
        let max_compactions = if full { usize::MAX } else { 1 };
        let blocks = self.read_blocks_from_source(max_compactions)?;

        match serde_json::to_vec(&blocks) {
            Ok(encoded) => {
                debug!(count = blocks.len(), file = %path.display(), "saving index listing to cache");
                self.store(&path, &encoded);
            }
            Err(e) => warn!(error = %e, "unable to encode index listing"),
        }

        Ok(blocks)
    }

    /// Scan index blocks from the backend, stopping once `max_compactions`
    /// compacted blocks have been seen.
    ///
    /// The backend listing is released on every exit path.
    pub fn read_blocks_from_source(
        &self,
        max_compactions: usize,
    ) -> Result<Vec<BlockInfo>, StorageError> {
        debug!(max_compactions, "reading index blocks from source");

        let listing = self.storage.list_blocks(INDEX_BLOCK_PREFIX);
        let mut blocks = Vec::new();
        let mut compactions = 0;

        for entry in listing {
            let info = entry?;
            trace!(block = %info.block_id, length = info.length, "found index block");

            let compacted = compacted_timestamp(&info.block_id).is_some();
            blocks.push(info);

            if compacted {
                compactions += 1;
                trace!(compactions, max_compactions, "found compaction");
                if compactions >= max_compactions {
                    break;
                }
            }
        }

        Ok(blocks)
    }

    /// Remove both listing snapshots.
    pub fn delete_list_cache(&self) {
        debug!("deleting list cache");
        for key in [LIST_FULL_KEY, LIST_ACTIVE_KEY] {
            let path = self.cached_item_path(key);
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != ErrorKind::NotFound
            {
                warn!(file = %path.display(), error = %e, "unable to delete list cache");
            }
        }
    }

    /// Sign `contents` and write it atomically to `path`.
    pub fn write_file_atomic(&self, path: &Path, contents: &[u8]) -> CacheResult<()> {
        write_file_atomic(&self.directory, path, &self.key.sign(contents))?;
        Ok(())
    }

    /// Run one eviction pass now.
    pub fn sweep_directory(&self) -> CacheResult<()> {
        self.sweeper.sweep()
    }

    /// Retained size published by the most recent sweep
    pub fn retained_size_bytes(&self) -> u64 {
        self.sweeper.state.lock().last_total_size_bytes
    }

    /// Snapshot of the cache counters
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the sweeper thread and wait for it to exit.
    ///
    /// No periodic sweep starts after this returns. Later calls do nothing.
    pub fn close(&mut self) {
        self.sweeper.state.lock().closed = true;

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.sweeper_handle.take()
            && handle.join().is_err()
        {
            warn!("block cache sweeper thread panicked");
        }
    }

    /// Best-effort signed write; failures are logged and counted.
    fn store(&self, path: &Path, contents: &[u8]) {
        if let Err(e) = self.write_file_atomic(path, contents) {
            warn!(file = %path.display(), error = %e, "unable to write cache file");
            self.metrics.record_write_failure();
        }
    }

    /// A verified, fresh listing snapshot, or `None` for any kind of miss.
    fn read_cached_listing(&self, path: &Path) -> Option<Vec<BlockInfo>> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(file = %path.display(), error = %e, "unable to open list cache");
                }
                return None;
            }
        };

        let modified = metadata.modified().ok()?;
        if !self.is_fresh(modified) {
            return None;
        }

        let decoded = fs::read(path)
            .map_err(CacheError::from)
            .and_then(|blob| Ok(self.key.verify_owned(blob)?))
            .and_then(|payload| Ok(serde_json::from_slice::<Vec<BlockInfo>>(&payload)?));

        match decoded {
            Ok(blocks) => Some(blocks),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "discarding cached listing");
                self.metrics.record_corrupt_entry();
                None
            }
        }
    }

    fn is_fresh(&self, modified: SystemTime) -> bool {
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age < self.list_cache_duration,
            // Modified in the future: clock skew, treat as just written.
            Err(_) => true,
        }
    }
}

impl<S: Storage> Drop for DiskBlockCache<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: Storage> std::fmt::Debug for DiskBlockCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskBlockCache")
            .field("directory", &self.directory)
            .field("list_cache_duration", &self.list_cache_duration)
            .field("max_size_bytes", &self.sweeper.max_size_bytes)
            .finish_non_exhaustive()
    }
}
