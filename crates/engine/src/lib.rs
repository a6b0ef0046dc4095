//! # Engine - DriftKV Storage Engine
//!
//! The central orchestrator that ties together the [`memtable`], [`wal`],
//! and [`sstable`] crates into a complete LSM-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌────────────────────────────────────────────────────────┐
//! │                       ENGINE                           │
//! │                                                        │
//! │ write.rs → WAL append → active memtable insert         │
//! │              |                                         │
//! │              | (size threshold reached?)               │
//! │              v            yes                          │
//! │      seal + rotate WAL + bounded queue                 │
//! │              |                                         │
//! │              v   flush worker thread                   │
//! │      flush.rs → new run → manager install              │
//! │                             |                          │
//! │                             | (run count high water?)  │
//! │                             v                          │
//! │      compactor thread: bucket select → k-way merge     │
//! │                      → atomic swap                     │
//! │                                                        │
//! │ read.rs → active memtable → sealed memtables           │
//! │         → runs newest-first (first definitive wins)    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, open/close, accessors, `Drop`       |
//! | [`config`]     | All tunables with defaults                           |
//! | [`error`]      | Unified error taxonomy                               |
//! | `recovery`     | WAL replay, run loading, debris cleanup              |
//! | `write`        | `put()`, `delete()`, sealing and handoff             |
//! | `read`         | `get()`                                              |
//! | `flush`        | Dedicated worker draining sealed memtables           |
//! | `compactor`    | Size-tiered selection, merge, tombstone GC, swap     |
//! | [`manifest`]   | Persistent newest-first run list (atomic file ops)   |
//!
//! ## Crash safety
//!
//! Every write is appended to the WAL **before** the memtable update. A WAL
//! segment is deleted only after the run covering it is durably installed
//! and recorded in the manifest. Runs are written into `.sst.tmp`
//! directories and renamed into place; their stats sidecar ends with a
//! completion magic, so interrupted builds are detected and removed on
//! startup.

mod compactor;
pub mod config;
pub mod error;
mod flush;
pub mod manifest;
mod read;
mod recovery;
mod write;

use crossbeam_channel::Sender;
use memtable::Memtable;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use wal::WalWriter;

pub use config::Config;
pub use error::{EngineError, Result};
pub use wal::SyncPolicy;

use compactor::CompactorHandle;
use flush::FlushJob;
use manifest::Manifest;
use sstable::TableManager;

/// Write-path state serialized by a single mutex: the WAL append order is
/// the sequence order.
pub(crate) struct WriteCore {
    /// Current monotonic sequence number.
    pub(crate) seq: u64,
    pub(crate) wal: WalWriter,
    /// Numbers the next WAL segment.
    pub(crate) next_segment_id: u64,
    /// Segments whose mutations live in the active memtable (active segment
    /// last). Deleted after the covering run installs.
    pub(crate) segments: Vec<std::path::PathBuf>,
}

/// Memtable handles snapshotted by readers.
pub(crate) struct MemView {
    pub(crate) active: Arc<RwLock<Memtable>>,
    /// Sealed but not yet flushed, newest first.
    pub(crate) sealed: Vec<Arc<RwLock<Memtable>>>,
}

/// State shared with the flush and compactor workers.
pub(crate) struct Shared {
    pub(crate) cfg: Config,
    pub(crate) core: Mutex<WriteCore>,
    pub(crate) state: RwLock<MemView>,
    pub(crate) tables: TableManager,
    pub(crate) manifest: Mutex<Manifest>,
    /// Wakes the compactor when the run count passes the high-water mark.
    pub(crate) compact_trigger: Sender<()>,
}

/// The central storage engine orchestrating memtable, WAL, runs, and the
/// background workers.
///
/// # Write path
///
/// 1. Take the writer lock, append to the WAL (durability barrier).
/// 2. Assign the next sequence number and apply to the active memtable.
/// 3. On reaching the size threshold: seal, rotate the WAL segment, install
///    a fresh memtable, and enqueue the sealed one for the flush worker
///    (blocking when the queue is full — that is the backpressure bound).
///
/// # Read path
///
/// 1. Briefly snapshot the active handle, the sealed list, and the run set.
/// 2. Probe active, then sealed newest-first, then runs newest-first.
/// 3. First definitive answer wins; tombstones report as not-found.
///
/// # Recovery
///
/// [`Engine::open`] replays WAL segments into a fresh memtable (with
/// synchronous interim flushes if they overfill it), loads the manifest's
/// runs, and removes debris from interrupted builds before serving.
pub struct Engine {
    shared: Arc<Shared>,
    flush_tx: Mutex<Option<Sender<FlushJob>>>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
    compactor: Mutex<Option<CompactorHandle>>,
    closed: AtomicBool,
}

impl Engine {
    /// Opens (or creates) an engine rooted at `cfg.data_dir`, performing
    /// full recovery before returning.
    pub fn open(cfg: Config) -> Result<Self> {
        let recovered = recovery::recover(&cfg)?;

        let wal_dir = cfg.wal_dir();
        let active_segment = wal_dir.join(segment_file_name(recovered.next_segment_id));
        let wal_writer = WalWriter::create(&active_segment, cfg.wal_sync_policy)?;

        let mut segments = recovered.old_segments;
        segments.push(active_segment);

        let (trigger_tx, trigger_rx) = crossbeam_channel::bounded(1);

        let shared = Arc::new(Shared {
            core: Mutex::new(WriteCore {
                seq: recovered.seq,
                wal: wal_writer,
                next_segment_id: recovered.next_segment_id + 1,
                segments,
            }),
            state: RwLock::new(MemView {
                active: Arc::new(RwLock::new(recovered.memtable)),
                sealed: Vec::new(),
            }),
            tables: TableManager::with_runs(recovered.runs),
            manifest: Mutex::new(recovered.manifest),
            compact_trigger: trigger_tx,
            cfg,
        });

        let (flush_tx, flush_rx) =
            crossbeam_channel::bounded(shared.cfg.flush_queue_capacity.max(1));
        let flush_shared = shared.clone();
        let flush_handle = std::thread::Builder::new()
            .name("driftkv-flush".into())
            .spawn(move || flush::run_worker(flush_shared, flush_rx))?;

        let compactor = compactor::spawn(shared.clone(), trigger_rx)?;

        info!(
            seq = shared.core.lock().seq,
            runs = shared.tables.len(),
            data_dir = %shared.cfg.data_dir.display(),
            "engine opened"
        );

        Ok(Self {
            shared,
            flush_tx: Mutex::new(Some(flush_tx)),
            flush_handle: Mutex::new(Some(flush_handle)),
            compactor: Mutex::new(Some(compactor)),
            closed: AtomicBool::new(false),
        })
    }

    /// Fails with [`EngineError::Cancelled`] once `close` has begun.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Stops the workers, flushes the active memtable, and syncs the WAL.
    ///
    /// Idempotent. The first subordinate error is returned; any further
    /// ones are logged. Acknowledged writes are durable when this returns:
    /// the final flush is waited on, and anything unflushed is still
    /// replayable from its WAL segment.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut errors: Vec<EngineError> = Vec::new();

        // Compactor first: an in-flight merge finishes its output but never
        // swaps it in.
        if let Some(compactor) = self.compactor.lock().take() {
            compactor.stop();
        }

        // Seal and flush whatever the active memtable holds, waiting for
        // the worker's acknowledgement.
        if let Err(e) = self.flush_active(true) {
            errors.push(e);
        }

        // Dropping the sender lets the worker drain the queue and exit.
        self.flush_tx.lock().take();
        if let Some(handle) = self.flush_handle.lock().take() {
            if handle.join().is_err() {
                errors.push(EngineError::Invariant("flush worker panicked".into()));
            }
        }

        if let Err(e) = self.shared.core.lock().wal.sync_to_disk() {
            errors.push(e.into());
        }

        info!("engine closed");

        let mut iter = errors.into_iter();
        match iter.next() {
            None => Ok(()),
            Some(first) => {
                for extra in iter {
                    warn!(error = %extra, "additional close error");
                }
                Err(first)
            }
        }
    }

    // ---- Accessors ----

    /// Returns the current monotonic sequence number.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.shared.core.lock().seq
    }

    /// Number of live on-disk runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.shared.tables.len()
    }

    /// Approximate byte size of the active memtable.
    #[must_use]
    pub fn memtable_bytes(&self) -> usize {
        self.shared.state.read().active.read().approx_size()
    }

    /// Sealed memtables waiting on the flush worker.
    #[must_use]
    pub fn sealed_memtable_count(&self) -> usize {
        self.shared.state.read().sealed.len()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Locks are taken one at a time; the write path holds the core lock
        // while acquiring the state lock, never the other way around.
        let seq = self.shared.core.lock().seq;
        let (memtable_bytes, memtable_entries, sealed) = {
            let state = self.shared.state.read();
            let active = state.active.read();
            (active.approx_size(), active.len(), state.sealed.len())
        };
        f.debug_struct("Engine")
            .field("seq", &seq)
            .field("data_dir", &self.shared.cfg.data_dir)
            .field("memtable_bytes", &memtable_bytes)
            .field("memtable_entries", &memtable_entries)
            .field("sealed_memtables", &sealed)
            .field("runs", &self.shared.tables.len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Best-effort close on drop.
///
/// Errors are logged rather than propagated — Drop cannot fail, and
/// anything left unflushed is still safe in its WAL segment.
impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "close during drop failed");
        }
    }
}

/// Run directory stem for a flush at `seq`: `run-<seq>-<millis>`.
///
/// The zero-padded sequence makes names sort by age and lets recovery
/// derive the highest flushed sequence without scanning data files.
pub(crate) fn run_stem(seq: u64) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("run-{:020}-{}", seq, ts)
}

/// Parses the sequence component back out of a run directory name.
pub(crate) fn parse_run_seq(name: &str) -> Option<u64> {
    name.strip_prefix("run-")?.get(..20)?.parse().ok()
}

/// WAL segment file name for a segment id.
pub(crate) fn segment_file_name(id: u64) -> String {
    format!("wal-{:020}.log", id)
}

/// Parses the id back out of a WAL segment file name.
pub(crate) fn parse_segment_id(name: &str) -> Option<u64> {
    name.strip_prefix("wal-")?.strip_suffix(".log")?.parse().ok()
}

#[cfg(test)]
mod tests;
