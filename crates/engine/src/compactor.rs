//! Background compactor: size-tiered bucket selection, k-way merge with
//! tombstone GC, and the atomic swap that commits the result.
//!
//! The worker wakes on a timer (`compaction_period`), on an explicit
//! trigger (fired when the live run count passes the high-water mark), or
//! on stop. Each cycle works entirely on a manifest snapshot — writers are
//! never blocked — and serializes only on the manager's swap lock for the
//! final commit. Any failure discards the partial output and leaves the
//! inputs live for the next cycle.

use crossbeam_channel::{bounded, tick, Receiver, Sender};
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

use sstable::{MergeIterator, RunScanner, TableError, TableReader, TableWriter};

use crate::error::{EngineError, Result};
use crate::{parse_run_seq, run_stem, Config, Engine, Shared};

/// Handle used by `close` to stop and join the worker.
pub(crate) struct CompactorHandle {
    stop_flag: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl CompactorHandle {
    /// Signals stop and joins. A merge in progress finishes its output but
    /// observes the flag before the swap and discards it.
    pub(crate) fn stop(self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.try_send(());
        if self.handle.join().is_err() {
            warn!("compactor thread panicked during shutdown");
        }
    }
}

pub(crate) fn spawn(shared: Arc<Shared>, trigger_rx: Receiver<()>) -> Result<CompactorHandle> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = bounded::<()>(1);

    let flag = stop_flag.clone();
    let handle = std::thread::Builder::new()
        .name("driftkv-compactor".into())
        .spawn(move || {
            let ticker = tick(shared.cfg.compaction_period);
            loop {
                crossbeam_channel::select! {
                    recv(ticker) -> _ => {}
                    recv(trigger_rx) -> msg => {
                        if msg.is_err() {
                            break;
                        }
                    }
                    recv(stop_rx) -> _ => break,
                }
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = run_cycle(&shared, &flag) {
                    warn!(error = %e, "compaction cycle failed; inputs remain live");
                }
            }
        })?;

    Ok(CompactorHandle {
        stop_flag,
        stop_tx,
        handle,
    })
}

impl Engine {
    /// Runs one compaction cycle synchronously on the caller's thread.
    ///
    /// Same selection/merge/swap path as the background worker; the commit
    /// is serialized against it by the manager's swap lock. Returns `true`
    /// if a bucket was compacted.
    pub fn compact_now(&self) -> Result<bool> {
        self.ensure_open()?;
        let never_stop = AtomicBool::new(false);
        run_cycle(&self.shared, &never_stop)
    }
}

/// One selection + merge + swap pass. Returns `true` if a swap committed.
fn run_cycle(shared: &Shared, stop: &AtomicBool) -> Result<bool> {
    let sst_dir = shared.cfg.sst_dir();
    let snap = shared.tables.snapshot();

    let candidates: Vec<CandidateRun> = snap
        .iter()
        .map(|r| CandidateRun {
            size: r.size_bytes(),
            hotness: r.read_hotness_score(),
            birth: r.birth_unix(),
        })
        .collect();

    let available = fs2::available_space(&sst_dir)?;
    let selected = select_inputs(&candidates, &shared.cfg, available);
    if selected.len() < 2 {
        return Ok(false);
    }

    let inputs: Vec<Arc<TableReader>> = selected
        .iter()
        .filter_map(|&pos| snap.get(pos).cloned())
        .collect();
    let input_names: Vec<String> = inputs.iter().map(|r| r.name().to_string()).collect();

    info!(
        inputs = inputs.len(),
        bytes = inputs.iter().map(|r| r.size_bytes()).sum::<u64>(),
        "compaction selected bucket"
    );

    // Runs older than the whole selection: a tombstone may only be dropped
    // when none of them can still hold its key.
    let oldest_pos = selected.iter().copied().max().unwrap_or(0);
    let older: Vec<Arc<TableReader>> = snap
        .iter()
        .enumerate()
        .filter(|(pos, _)| *pos > oldest_pos && !selected.contains(pos))
        .map(|(_, r)| r.clone())
        .collect();
    let gc_before = shared.cfg.tombstone_gc_before_seq;

    let mut scanners = Vec::with_capacity(inputs.len());
    for run in &inputs {
        scanners.push(RunScanner::open(run.path())?);
    }
    let mut merge = MergeIterator::new(scanners)?;

    // The output name reuses the newest input's sequence component so that
    // recovery's sequence floor stays correct.
    let max_input_seq = inputs
        .iter()
        .filter_map(|r| parse_run_seq(r.name()))
        .max()
        .unwrap_or(0);
    let mut writer = TableWriter::create(&sst_dir, &run_stem(max_input_seq), shared.cfg.table_options())?;

    let mut dropped_tombstones = 0u64;
    let mut merge_err: Option<EngineError> = None;
    loop {
        match merge.next_entry() {
            Ok(Some((key, entry))) => {
                if entry.value.is_none()
                    && entry.seq <= gc_before
                    && !older.iter().any(|r| r.key_in_range(&key))
                {
                    dropped_tombstones += 1;
                    continue;
                }
                if let Err(e) = writer.add(&key, &entry) {
                    merge_err = Some(e.into());
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                merge_err = Some(e.into());
                break;
            }
        }
    }
    if let Some(e) = merge_err {
        writer.discard();
        return Err(e);
    }

    // Shutdown requested: the finished output is discardable, never swapped.
    if stop.load(Ordering::SeqCst) {
        writer.discard();
        info!("compaction cancelled before commit");
        return Ok(false);
    }

    // Every entry may have been GC'd; a swap with no produced runs is valid.
    let produced: Vec<Arc<TableReader>> = match writer.finish() {
        Ok(path) => vec![Arc::new(TableReader::open(&path)?)],
        Err(TableError::Empty) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    {
        let mut manifest = shared.manifest.lock();
        match shared.tables.swap(&input_names, produced.clone()) {
            Ok(retired) => drop(retired), // dirs removed on last snapshot drop
            Err(e) => {
                for run in &produced {
                    run.mark_retired();
                }
                return Err(e.into());
            }
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

    info!(
        consumed = input_names.len(),
        produced = produced.len(),
        dropped_tombstones,
        "compaction committed"
    );
    Ok(true)
}

/// One run's selection-relevant attributes; index in the candidate slice is
/// its newest-first position in the snapshot.
pub(crate) struct CandidateRun {
    pub(crate) size: u64,
    pub(crate) hotness: f64,
    pub(crate) birth: u64,
}

/// Full selection: size-tiered bucketing, threshold filter, hotness pick,
/// disk guard. Returns snapshot positions of the chosen inputs.
pub(crate) fn select_inputs(
    runs: &[CandidateRun],
    cfg: &Config,
    available_disk: u64,
) -> Vec<usize> {
    let buckets = bucket_by_size(runs, cfg.compaction_size_tolerance);
    match choose_bucket(&buckets, runs, cfg.compaction_min_threshold) {
        Some(bucket) => fit_to_disk(bucket, runs, available_disk),
        None => Vec::new(),
    }
}

/// Groups runs into buckets of approximately equal size: sort ascending,
/// open a bucket with the smallest run, append runs within the tolerance
/// band of the bucket's first run, start a new bucket otherwise.
fn bucket_by_size(runs: &[CandidateRun], (lo, hi): (f64, f64)) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..runs.len()).collect();
    order.sort_by_key(|&i| runs[i].size);

    let mut buckets: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    for i in order {
        if current.is_empty() {
            current.push(i);
            continue;
        }
        let rep = runs[current[0]].size as f64;
        let size = runs[i].size as f64;
        if size >= rep * lo && size <= rep * hi {
            current.push(i);
        } else {
            buckets.push(std::mem::take(&mut current));
            current.push(i);
        }
    }
    if !current.is_empty() {
        buckets.push(current);
    }
    buckets
}

/// Among buckets with at least `min_threshold` runs, picks the one with the
/// highest aggregate read-hotness score. Ties break to the larger bucket,
/// then to the one holding the oldest run.
fn choose_bucket(
    buckets: &[Vec<usize>],
    runs: &[CandidateRun],
    min_threshold: usize,
) -> Option<Vec<usize>> {
    let mut best: Option<(f64, usize, u64, &Vec<usize>)> = None;

    for bucket in buckets.iter().filter(|b| b.len() >= min_threshold.max(2)) {
        let score: f64 = bucket.iter().map(|&i| runs[i].hotness).sum();
        let oldest_birth = bucket.iter().map(|&i| runs[i].birth).min().unwrap_or(u64::MAX);

        let better = match &best {
            None => true,
            Some((best_score, best_len, best_birth, _)) => {
                score > *best_score
                    || (score == *best_score
                        && (bucket.len() > *best_len
                            || (bucket.len() == *best_len && oldest_birth < *best_birth)))
            }
        };
        if better {
            best = Some((score, bucket.len(), oldest_birth, bucket));
        }
    }

    best.map(|(_, _, _, bucket)| bucket.clone())
}

/// Disk-space guard: while the selection does not fit in the available
/// space, drop whole runs, largest first. Never splits a run.
fn fit_to_disk(mut bucket: Vec<usize>, runs: &[CandidateRun], available: u64) -> Vec<usize> {
    let mut total: u64 = bucket.iter().map(|&i| runs[i].size).sum();
    if total <= available {
        return bucket;
    }

    bucket.sort_by_key(|&i| Reverse(runs[i].size));
    let mut cut = 0;
    while cut < bucket.len() && total > available {
        total -= runs[bucket[cut]].size;
        cut += 1;
    }
    let kept: Vec<usize> = bucket.split_off(cut);
    warn!(
        dropped = cut,
        kept = kept.len(),
        "compaction inputs trimmed to fit available disk"
    );
    kept
}
