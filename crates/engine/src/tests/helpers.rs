use crate::{Config, Engine};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Config tuned for tests: background compaction effectively disabled so
/// every cycle is driven explicitly through `compact_now`.
pub fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::new(dir);
    cfg.compaction_period = Duration::from_secs(3600);
    cfg.compaction_high_water = usize::MAX;
    cfg
}

pub fn open_engine(dir: &Path) -> Engine {
    Engine::open(test_config(dir)).unwrap()
}

pub fn open_engine_with(dir: &Path, memtable_max_bytes: usize) -> Engine {
    let mut cfg = test_config(dir);
    cfg.memtable_max_bytes = memtable_max_bytes;
    Engine::open(cfg).unwrap()
}

/// Abandons the engine without running `close` — the moral equivalent of a
/// crash. Worker threads stay parked on their queues and leak for the rest
/// of the test process, which is fine.
pub fn crash(engine: Engine) {
    std::mem::forget(engine);
}

/// Live (non-comment) lines of the MANIFEST, newest first.
pub fn manifest_entries(dir: &Path) -> Vec<String> {
    let text = fs::read_to_string(dir.join("sst").join("MANIFEST")).unwrap();
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Number of `.sst` run directories on disk.
pub fn count_run_dirs(dir: &Path) -> usize {
    fs::read_dir(dir.join("sst"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "sst")
                .unwrap_or(false)
        })
        .count()
}

/// Paths of WAL segment files, sorted ascending.
pub fn wal_segments(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut segs: Vec<_> = fs::read_dir(dir.join("wal"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("wal-") && n.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();
    segs.sort();
    segs
}
