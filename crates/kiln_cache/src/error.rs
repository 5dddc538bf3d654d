//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur while writing to the digest store.
///
/// Reads are fail-safe and never produce an error: a missing or unreadable
/// entry is reported as a miss. Writes are advisory for callers (the
/// transformed bytes are already in memory), but the failure is still typed
/// so it can be logged with the offending path.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while writing a cache entry.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
