//! Write path: `put()`, `delete()`, `force_flush()`, and the seal/handoff
//! machinery.
//!
//! All mutations flow through here. Each write is appended to the WAL under
//! the writer lock — so WAL order equals sequence order — and only then
//! applied to the active memtable (durability before visibility: a failed
//! append leaves the memtable untouched). When the memtable reaches its
//! size threshold it is sealed, the WAL rotates to a fresh segment, and the
//! sealed table is handed to the flush worker over a bounded queue. A full
//! queue blocks the writer, which is the engine's backpressure bound.

use crossbeam_channel::Receiver;
use memtable::Memtable;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;
use wal::WalRecord;

use crate::error::{EngineError, Result};
use crate::flush::FlushJob;
use crate::{run_stem, segment_file_name, Engine, WriteCore};

impl Engine {
    /// Inserts a key-value pair.
    ///
    /// Returns once the record is durable under the configured WAL sync
    /// policy and visible to subsequent reads.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.check_key(&key)?;
        if value.len() > self.shared.cfg.max_value_bytes {
            return Err(EngineError::InvalidArgument(format!(
                "value too large: {} bytes (max {})",
                value.len(),
                self.shared.cfg.max_value_bytes
            )));
        }

        let mut core = self.shared.core.lock();

        // WAL first; the memtable is untouched if the append fails.
        core.wal.append(&WalRecord::Put {
            key: key.clone(),
            value: value.clone(),
        })?;

        core.seq = core
            .seq
            .checked_add(1)
            .ok_or_else(|| EngineError::Invariant("sequence number overflow".into()))?;
        let seq = core.seq;

        let active = self.shared.state.read().active.clone();
        let applied = active.write().put(key, value, seq)?;

        if applied.needs_flush {
            self.seal_and_enqueue(&mut core, None)?;
        }
        Ok(())
    }

    /// Deletes a key by writing a tombstone.
    ///
    /// The tombstone shadows any older value in sealed memtables and runs;
    /// it is garbage-collected by compaction once nothing older can hold
    /// the key.
    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        self.ensure_open()?;
        self.check_key(&key)?;

        let mut core = self.shared.core.lock();

        core.wal.append(&WalRecord::Del { key: key.clone() })?;

        core.seq = core
            .seq
            .checked_add(1)
            .ok_or_else(|| EngineError::Invariant("sequence number overflow".into()))?;
        let seq = core.seq;

        let active = self.shared.state.read().active.clone();
        let applied = active.write().delete(key, seq)?;

        if applied.needs_flush {
            self.seal_and_enqueue(&mut core, None)?;
        }
        Ok(())
    }

    /// Seals the active memtable (if non-empty) and waits for the flush
    /// worker to write and install its run.
    pub fn force_flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.flush_active(true)
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(EngineError::InvalidArgument("key must not be empty".into()));
        }
        if key.len() > self.shared.cfg.max_key_bytes {
            return Err(EngineError::InvalidArgument(format!(
                "key too large: {} bytes (max {})",
                key.len(),
                self.shared.cfg.max_key_bytes
            )));
        }
        Ok(())
    }

    /// Seals the active memtable and enqueues it; optionally waits for the
    /// worker's acknowledgement. Used by `force_flush` and `close`.
    pub(crate) fn flush_active(&self, wait: bool) -> Result<()> {
        let done_rx = {
            let mut core = self.shared.core.lock();

            if self.shared.state.read().active.read().is_empty() {
                return Ok(());
            }

            let (done_tx, done_rx) = crossbeam_channel::bounded(1);
            self.seal_and_enqueue(&mut core, Some(done_tx))?;
            done_rx
        };

        if wait {
            return Self::await_flush(&done_rx);
        }
        Ok(())
    }

    fn await_flush(done_rx: &Receiver<Result<()>>) -> Result<()> {
        match done_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(EngineError::Cancelled), // worker gone before acking
        }
    }

    /// Rotates the WAL, seals the active memtable into the sealed list,
    /// installs a fresh one, and hands the sealed table to the flush
    /// worker.
    ///
    /// Runs entirely under the writer lock: a full flush queue therefore
    /// blocks writers (never readers) until a slot frees up, bounding
    /// unflushed memory to `memtable_max_bytes * (queue_capacity + 1)`.
    fn seal_and_enqueue(
        &self,
        core: &mut WriteCore,
        done: Option<crossbeam_channel::Sender<Result<()>>>,
    ) -> Result<()> {
        // New segment first: every mutation after this point lands there,
        // so the sealed memtable exactly covers the old segments.
        let new_segment = self
            .shared
            .cfg
            .wal_dir()
            .join(segment_file_name(core.next_segment_id));
        core.next_segment_id += 1;
        core.wal.rotate(&new_segment)?;
        let covered = std::mem::replace(&mut core.segments, vec![new_segment]);

        let sealed = {
            let mut state = self.shared.state.write();
            state.active.write().seal();
            let fresh = Arc::new(RwLock::new(Memtable::new(
                self.shared.cfg.memtable_max_bytes,
            )));
            let sealed = std::mem::replace(&mut state.active, fresh);
            state.sealed.insert(0, sealed.clone());
            sealed
        };

        debug!(
            seq = core.seq,
            bytes = sealed.read().approx_size(),
            "sealed memtable"
        );

        let job = FlushJob {
            memtable: sealed,
            covered_segments: covered,
            run_stem: run_stem(core.seq),
            done,
        };

        let tx = self
            .flush_tx
            .lock()
            .as_ref()
            .cloned()
            .ok_or(EngineError::Cancelled)?;
        tx.send(job)
            .map_err(|_| EngineError::Cancelled)?;
        Ok(())
    }
}
