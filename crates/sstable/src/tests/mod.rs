mod scanner_tests;

use crate::{TableOptions, TableReader, TableWriter};
use memtable::ValueEntry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Writes a run named `name` from (key, value-or-tombstone, seq) triples.
/// Entries may arrive in any order; they are sorted by key here.
pub fn build_run(
    dir: &Path,
    name: &str,
    opts: TableOptions,
    entries: &[(&[u8], Option<&[u8]>, u64)],
) -> PathBuf {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut w = TableWriter::create(dir, name, opts).unwrap();
    for (key, value, seq) in sorted {
        let entry = ValueEntry {
            seq,
            value: value.map(|v| v.to_vec()),
        };
        w.add(key, &entry).unwrap();
    }
    w.finish().unwrap()
}

/// Builds and opens a run in one step.
pub fn open_run(
    dir: &Path,
    name: &str,
    entries: &[(&[u8], Option<&[u8]>, u64)],
) -> Arc<TableReader> {
    let path = build_run(dir, name, TableOptions::default(), entries);
    Arc::new(TableReader::open(&path).unwrap())
}
