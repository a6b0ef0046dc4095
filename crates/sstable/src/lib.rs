//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk runs for the DriftKV storage engine.
//!
//! When the in-memory [`memtable::Memtable`] is sealed, the flush task
//! streams it to disk as a run. Runs are *write-once, read-many* — once
//! created they are never modified (only replaced during compaction).
//!
//! ## On-disk layout
//!
//! One directory per run, `<name>.sst/`, holding five sibling files:
//!
//! ```text
//! ┌── data ───────────────────────────────────────────────────────┐
//! │ key_len (u32) | key | value_len (u32, 0xFFFF_FFFF = tombstone)│
//! │ [value] | seq (u64)                                           │
//! │ ... sorted ascending by key ...                               │
//! ├── index ──────────────────────────────────────────────────────┤
//! │ key_len (u32) | key | data_offset (u64)    one per entry      │
//! ├── summary ────────────────────────────────────────────────────┤
//! │ key_len (u32) | key | index_offset (u64)   one per stride     │
//! ├── bloom ──────────────────────────────────────────────────────┤
//! │ num_hashes (u8) | bit_count (u64) | packed bits               │
//! ├── stats ──────────────────────────────────────────────────────┤
//! │ entry_count (u64) | tombstone_count (u64)                     │
//! │ min_key_len (u32) | min_key | max_key_len (u32) | max_key     │
//! │ birth_unix (u64) | magic (u64)                                │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The run is built in a `<name>.sst.tmp/`
//! directory and renamed into place; the trailing magic of `stats` is the
//! completion marker, so a run missing it (crash mid-finalize) is detected
//! and discarded on startup.
//!
//! ## Read path
//!
//! A point lookup consults the bloom filter, binary-searches the in-memory
//! summary for the index page that could hold the key, scans that one page,
//! and finally performs a single seek into `data`. Only the summary, bloom,
//! and stats live in memory; `data` and `index` are read through persistent
//! file handles.

mod format;
mod manager;
mod merge;
mod reader;
mod scanner;
mod writer;

use std::io;
use thiserror::Error;

pub use format::{is_complete_run, Stats, RUN_EXT, STATS_MAGIC, TMP_EXT, TOMBSTONE_SENTINEL};
pub use manager::{Snapshot, TableManager};
pub use merge::MergeIterator;
pub use reader::TableReader;
pub use scanner::RunScanner;
pub use writer::{TableOptions, TableWriter};

/// Errors from run construction, lookup, and management.
#[derive(Debug, Error)]
pub enum TableError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A sidecar failed structural validation (bad magic, mismatched key,
    /// absurd length).
    #[error("corrupt run: {0}")]
    Corrupt(String),

    /// A run with zero entries was finalized.
    #[error("run has no entries")]
    Empty,

    /// The manager was asked to do something inconsistent with the live
    /// run set.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[cfg(test)]
mod tests;
