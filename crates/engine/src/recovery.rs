//! Cold-start recovery: load the manifest's runs, clean up debris from
//! interrupted builds, and replay WAL segments into a fresh memtable.
//!
//! Replay re-assigns sequence numbers in log order, starting above the
//! highest sequence any live run carries (derived from run names, which
//! embed the sequence current at flush time). If a replayed segment
//! overfills the memtable, it is flushed synchronously and replay continues
//! into a fresh one. Replayed segments are *not* deleted here — they fall
//! with the first post-recovery flush that covers them, keeping the
//! segment-deletion rule in one place.
//!
//! A torn tail in the newest segment is tolerated (the WAL reader truncates
//! cleanly); corruption anywhere else aborts recovery and the engine does
//! not serve.

use memtable::Memtable;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use wal::{WalReader, WalRecord};

use sstable::{is_complete_run, RunScanner, TableReader, RUN_EXT, TMP_EXT};

use crate::error::{EngineError, Result};
use crate::flush::write_run;
use crate::manifest::Manifest;
use crate::{parse_run_seq, parse_segment_id, run_stem, Config};

/// Everything `Engine::open` needs to start serving.
pub(crate) struct Recovered {
    pub(crate) memtable: Memtable,
    pub(crate) seq: u64,
    pub(crate) next_segment_id: u64,
    /// Live runs, newest first.
    pub(crate) runs: Vec<Arc<TableReader>>,
    pub(crate) manifest: Manifest,
    /// Pre-existing WAL segments covered by the recovered memtable,
    /// oldest first.
    pub(crate) old_segments: Vec<PathBuf>,
}

pub(crate) fn recover(cfg: &Config) -> Result<Recovered> {
    let wal_dir = cfg.wal_dir();
    let sst_dir = cfg.sst_dir();
    fs::create_dir_all(&wal_dir)?;
    fs::create_dir_all(&sst_dir)?;

    cleanup_tmp_runs(&sst_dir);

    let (mut manifest, runs) = load_runs(cfg)?;

    // The sequence floor: nothing already flushed may be re-assigned.
    let mut seq = 0u64;
    for run in &runs {
        seq = seq.max(run_seq_floor(run)?);
    }

    // WAL segments, oldest first.
    let mut segments: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&wal_dir)? {
        let path = entry?.path();
        if let Some(id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_segment_id)
        {
            segments.push((id, path));
        }
    }
    segments.sort_by_key(|(id, _)| *id);
    let next_segment_id = segments.last().map(|(id, _)| id + 1).unwrap_or(0);

    let mut memtable = Memtable::new(cfg.memtable_max_bytes);
    let mut runs = runs;
    let mut replayed = 0u64;

    for (_, path) in &segments {
        let mut reader = WalReader::open(path)?;
        let mut pending: Option<EngineError> = None;

        reader.replay(|record| {
            if pending.is_some() {
                return;
            }

            seq += 1;
            replayed += 1;
            let applied = match record {
                WalRecord::Put { key, value } => memtable.put(key, value, seq),
                WalRecord::Del { key } => memtable.delete(key, seq),
            };
            let applied = match applied {
                Ok(a) => a,
                Err(_) => {
                    pending = Some(EngineError::Invariant(
                        "recovery memtable unexpectedly sealed".into(),
                    ));
                    return;
                }
            };

            // Interim flush: a replayed segment can hold more than one
            // memtable's worth of data.
            if applied.needs_flush {
                match interim_flush(cfg, &mut manifest, &mut runs, seq, &memtable) {
                    Ok(fresh) => memtable = fresh,
                    Err(e) => pending = Some(e),
                }
            }
        })?;

        if let Some(e) = pending {
            return Err(e);
        }
    }

    if replayed > 0 {
        info!(
            records = replayed,
            segments = segments.len(),
            seq,
            "wal replay complete"
        );
    }

    Ok(Recovered {
        memtable,
        seq,
        next_segment_id,
        runs,
        manifest,
        old_segments: segments.into_iter().map(|(_, p)| p).collect(),
    })
}

/// Loads the live runs from the manifest, falling back to a directory scan
/// when no manifest exists yet. Orphan runs (on disk but unreferenced) are
/// debris from a crash between rename and manifest save; their WAL
/// segments still exist, so they are safe to delete.
fn load_runs(cfg: &Config) -> Result<(Manifest, Vec<Arc<TableReader>>)> {
    let sst_dir = cfg.sst_dir();
    let mut manifest = Manifest::load_or_create(&sst_dir)?;
    let mut runs = Vec::new();

    if manifest.entries.is_empty() {
        // Fresh database or pre-manifest layout: adopt every complete run,
        // newest first (names embed the flush sequence).
        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&sst_dir)? {
            let path = entry?.path();
            let is_run = path
                .extension()
                .map(|e| e == RUN_EXT)
                .unwrap_or(false);
            if is_run && is_complete_run(&path) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        names.reverse();

        for name in &names {
            runs.push(Arc::new(TableReader::open(&sst_dir.join(name))?));
        }
        if !names.is_empty() {
            manifest.set_runs(names);
            manifest.save()?;
        }
        return Ok((manifest, runs));
    }

    let mut kept = Vec::new();
    for name in manifest.entries.clone() {
        let path = sst_dir.join(&name);
        if path.exists() {
            runs.push(Arc::new(TableReader::open(&path)?));
            kept.push(name);
        } else {
            warn!(run = %name, "manifest references a missing run; dropping entry");
        }
    }
    if kept.len() != manifest.entries.len() {
        manifest.set_runs(kept);
        manifest.save()?;
    }

    // Orphaned complete runs: never installed, still covered by the WAL.
    for entry in fs::read_dir(&sst_dir)? {
        let path = entry?.path();
        let is_run = path.extension().map(|e| e == RUN_EXT).unwrap_or(false);
        if !is_run {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !manifest.contains(name) {
                warn!(run = %name, "removing orphan run left by an interrupted flush");
                let _ = fs::remove_dir_all(&path);
            }
        }
    }

    Ok((manifest, runs))
}

/// Highest sequence a run can contain: parsed from its name, with a full
/// data scan as the fallback for foreign names.
fn run_seq_floor(run: &TableReader) -> Result<u64> {
    if let Some(seq) = parse_run_seq(run.name()) {
        return Ok(seq);
    }
    let mut scanner = RunScanner::open(run.path())?;
    let mut max = 0u64;
    while let Some((_, entry)) = scanner.next_entry()? {
        max = max.max(entry.seq);
    }
    Ok(max)
}

/// Writes the overfull recovery memtable out as a run and returns a fresh
/// one. Segments are left in place; they are deleted by the first normal
/// flush after recovery.
fn interim_flush(
    cfg: &Config,
    manifest: &mut Manifest,
    runs: &mut Vec<Arc<TableReader>>,
    seq: u64,
    memtable: &Memtable,
) -> Result<Memtable> {
    let stem = run_stem(seq);
    let reader = write_run(&cfg.sst_dir(), &stem, cfg.table_options(), memtable)?;

    info!(run = reader.name(), entries = reader.entry_count(), "interim flush during recovery");

    manifest.add_front(reader.name().to_string());
    manifest.save()?;
    runs.insert(0, reader);

    Ok(Memtable::new(cfg.memtable_max_bytes))
}

/// Removes `.sst.tmp` directories left by interrupted run builds.
fn cleanup_tmp_runs(sst_dir: &std::path::Path) {
    let Ok(entries) = fs::read_dir(sst_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(&format!(".{}", TMP_EXT)) {
                warn!(dir = %path.display(), "removing incomplete run build");
                let _ = fs::remove_dir_all(&path);
            }
        }
    }
}
