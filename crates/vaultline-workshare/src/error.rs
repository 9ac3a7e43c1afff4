//! Error types for the worker pool

use thiserror::Error;

/// Errors raised while building a pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// The operating system refused to start a worker thread
    #[error("failed to spawn worker thread {index}: {source}")]
    Spawn {
        /// Zero-based index of the worker that failed to start
        index: usize,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },
}
