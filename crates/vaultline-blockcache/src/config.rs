//! Block cache configuration
//!
//! Loading the configuration from files or the environment is left to the
//! embedding application; this module only defines the shape, defaults and
//! validation.

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, time::Duration};

/// Default freshness window for cached index listings
pub const DEFAULT_LIST_CACHE_DURATION: Duration = Duration::from_secs(10 * 60);

/// Disk block cache configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskBlockCacheConfig {
    /// Directory holding the `.cached` files
    pub cache_dir: PathBuf,
    /// Size budget enforced by the sweeper; 0 disables eviction
    pub max_size_bytes: u64,
    /// How long a cached listing is served without asking the backend
    pub list_cache_duration: Duration,
    /// Secret used to sign every cached file
    pub hmac_secret: Vec<u8>,
}

impl Default for DiskBlockCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            max_size_bytes: 0,
            list_cache_duration: DEFAULT_LIST_CACHE_DURATION,
            hmac_secret: Vec::new(),
        }
    }
}

impl DiskBlockCacheConfig {
    /// Create a configuration for the given cache directory
    pub fn new<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Set the size budget
    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Set the listing freshness window
    pub fn with_list_cache_duration(mut self, duration: Duration) -> Self {
        self.list_cache_duration = duration;
        self
    }

    /// Set the signing secret
    pub fn with_hmac_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.hmac_secret = secret.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }

        Ok(())
    }
}

impl fmt::Debug for DiskBlockCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskBlockCacheConfig")
            .field("cache_dir", &self.cache_dir)
            .field("max_size_bytes", &self.max_size_bytes)
            .field("list_cache_duration", &self.list_cache_duration)
            .field("hmac_secret", &"<redacted>")
            .finish()
    }
}
