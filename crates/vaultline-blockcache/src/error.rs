//! Error types for block cache operations
//!
//! Two families are kept apart:
//!
//! - [`StorageError`] comes from the remote block store and is what the
//!   public cache operations return. The cache passes it through unchanged.
//! - [`CacheError`] describes faults in the local cache layer (unreadable
//!   files, bad signatures, failed writes). These are logged and demoted to
//!   cache misses by the read/write paths; they only surface from
//!   construction, sweeping and the low-level helpers.

use thiserror::Error;

/// Result type for local cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors reported by a remote block store
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested block does not exist in the store.
    ///
    /// This is an expected outcome, not a fault.
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// IO error inside the backend
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A range read fell outside the stored block
    #[error(transparent)]
    Range(#[from] RangeError),

    /// Backend-specific failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether this is the distinguished "not found" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlockNotFound(_))
    }
}

/// Errors raised by the local cache layer
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error while reading or writing cache files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A cached file failed integrity verification
    #[error("Integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    /// A listing snapshot could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// The background sweeper thread could not be started
    #[error("Failed to start sweeper thread: {0}")]
    SweeperSpawn(#[source] std::io::Error),
}

/// HMAC verification failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// The blob cannot even hold a tag
    #[error("invalid data - too short ({len} bytes)")]
    TooShort {
        /// Length of the rejected blob
        len: usize,
    },

    /// The tag does not match the payload
    #[error("invalid data - corrupted")]
    Corrupted,
}

/// A requested range does not fit inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("range out of bounds (offset={offset}, length={length:?}, actual length={actual})")]
pub struct RangeError {
    /// Requested start offset
    pub offset: u64,
    /// Requested length, `None` meaning "to the end"
    pub length: Option<u64>,
    /// Actual buffer length
    pub actual: usize,
}
