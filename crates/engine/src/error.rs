//! Engine error taxonomy.
//!
//! Subsystem errors (`wal`, `sstable`, `memtable`) are folded into one enum
//! at the façade so callers get a stable (kind, message) surface; the CLI
//! (or any other front-end) maps kinds to its own status codes.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Unified error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or fsync failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad framing, failed checksum, or a truncated non-tail region.
    #[error("corruption: {0}")]
    Corruption(String),

    /// Out of disk during flush or compaction.
    #[error("disk space exhausted: {0}")]
    QuotaExceeded(String),

    /// The live run set or manifest is internally inconsistent.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A mutation reached a sealed memtable.
    #[error("memtable is sealed")]
    Sealed,

    /// The operation was aborted because the engine is shutting down.
    #[error("engine is closed")]
    Cancelled,

    /// The caller passed an unusable key or value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<wal::WalError> for EngineError {
    fn from(e: wal::WalError) -> Self {
        match e {
            wal::WalError::Io(io) => EngineError::Io(io),
            wal::WalError::Corrupt => EngineError::Corruption("wal record corrupt".into()),
        }
    }
}

impl From<sstable::TableError> for EngineError {
    fn from(e: sstable::TableError) -> Self {
        match e {
            sstable::TableError::Io(io) => EngineError::Io(io),
            sstable::TableError::Corrupt(m) => EngineError::Corruption(m),
            sstable::TableError::Empty => {
                EngineError::Invariant("finalized a run with no entries".into())
            }
            sstable::TableError::Invariant(m) => EngineError::Invariant(m),
        }
    }
}

impl From<memtable::Sealed> for EngineError {
    fn from(_: memtable::Sealed) -> Self {
        EngineError::Sealed
    }
}
