//! Flush worker: drains sealed memtables from the bounded queue, writes
//! each to a new run, installs it, and only then releases the WAL segments
//! the memtable covered.
//!
//! A failed flush is retried with exponential backoff. If the attempt
//! budget runs out, the memtable stays in the sealed list (still readable)
//! and its segments stay on disk (still replayable) — nothing acknowledged
//! is lost, and the failure is surfaced to any caller waiting on the job.

use crossbeam_channel::{Receiver, Sender};
use memtable::Memtable;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use sstable::{is_complete_run, TableOptions, TableReader, TableWriter, RUN_EXT};

use crate::error::{EngineError, Result};
use crate::Shared;

const MAX_ATTEMPTS: u32 = 5;

/// One sealed memtable on its way to disk.
pub(crate) struct FlushJob {
    pub(crate) memtable: Arc<RwLock<Memtable>>,
    /// WAL segments whose mutations live in `memtable`; deleted after the
    /// run is durably installed.
    pub(crate) covered_segments: Vec<PathBuf>,
    /// Run directory stem chosen at seal time.
    pub(crate) run_stem: String,
    /// Acknowledgement channel for `force_flush` / `close`.
    pub(crate) done: Option<Sender<Result<()>>>,
}

/// Worker loop; exits when the engine drops the sending side.
pub(crate) fn run_worker(shared: Arc<Shared>, rx: Receiver<FlushJob>) {
    while let Ok(job) = rx.recv() {
        let result = flush_with_retry(&shared, &job);
        if let Err(e) = &result {
            error!(
                error = %e,
                run = %job.run_stem,
                "flush abandoned; memtable retained and wal segments kept"
            );
        }
        if let Some(done) = &job.done {
            let _ = done.send(result);
        }
    }
}

fn flush_with_retry(shared: &Shared, job: &FlushJob) -> Result<()> {
    let mut backoff = Duration::from_millis(10);
    let mut attempt = 1;
    loop {
        match flush_once(shared, job) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!(
                    error = %e,
                    attempt,
                    run = %job.run_stem,
                    "flush attempt failed; backing off"
                );
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(Duration::from_secs(1));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn flush_once(shared: &Shared, job: &FlushJob) -> Result<()> {
    let sst_dir = shared.cfg.sst_dir();

    {
        let mem = job.memtable.read();
        if mem.is_empty() {
            drop(mem);
            retire_job(shared, job);
            return Ok(());
        }

        // Point-in-time probe; a stale answer just means one failed attempt
        // and a retry.
        let needed = mem.approx_size() as u64;
        let available = fs2::available_space(&sst_dir)?;
        if available < needed {
            return Err(EngineError::QuotaExceeded(format!(
                "flush needs {} bytes, {} available",
                needed, available
            )));
        }

        let reader = write_run(&sst_dir, &job.run_stem, shared.cfg.table_options(), &mem)?;
        drop(mem);

        let entries = reader.entry_count();
        let run_name = reader.name().to_string();

        {
            let mut manifest = shared.manifest.lock();
            // A retry after a failed manifest save finds the run already
            // installed; don't install it twice.
            let already_live = shared
                .tables
                .snapshot()
                .iter()
                .any(|r| r.name() == run_name);
            if !already_live {
                shared.tables.install(reader);
            }
            let names = shared
                .tables
                .snapshot()
                .iter()
                .map(|r| r.name().to_string())
                .collect();
            manifest.set_runs(names);
            manifest.save()?;
        }

        info!(run = %run_name, entries, "flushed memtable to run");
    }

    retire_job(shared, job);

    if shared.tables.len() >= shared.cfg.compaction_high_water {
        let _ = shared.compact_trigger.try_send(());
    }
    Ok(())
}

/// Drops the memtable from the sealed list and deletes the WAL segments it
/// covered. Only called after the run is installed (or the table was
/// empty).
fn retire_job(shared: &Shared, job: &FlushJob) {
    {
        let mut state = shared.state.write();
        state.sealed.retain(|m| !Arc::ptr_eq(m, &job.memtable));
    }

    for segment in &job.covered_segments {
        if let Err(e) = fs::remove_file(segment) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    error = %e,
                    segment = %segment.display(),
                    "failed to delete covered wal segment"
                );
            }
        }
    }
}

/// Streams a memtable into a finalized run and opens a reader on it.
///
/// If a complete run with this stem already exists (a retry after the
/// install step failed), it is reused rather than rebuilt.
pub(crate) fn write_run(
    sst_dir: &Path,
    stem: &str,
    opts: TableOptions,
    mem: &Memtable,
) -> Result<Arc<TableReader>> {
    let final_dir = sst_dir.join(format!("{}.{}", stem, RUN_EXT));
    if final_dir.exists() && is_complete_run(&final_dir) {
        return Ok(Arc::new(TableReader::open(&final_dir)?));
    }

    let mut writer = TableWriter::create(sst_dir, stem, opts)?;
    for (key, entry) in mem.iter() {
        writer.add(key, entry)?;
    }
    let path = writer.finish()?;
    Ok(Arc::new(TableReader::open(&path)?))
}
