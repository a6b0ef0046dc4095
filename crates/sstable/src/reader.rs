//! Point-lookup reader over a finalized run.
//!
//! `open` loads the small sidecars (stats, bloom, summary) into memory and
//! keeps persistent handles on `data` and `index`. A lookup touches disk at
//! most twice: one bounded index-page scan and one data seek.

use byteorder::{LittleEndian, ReadBytesExt};
use memtable::Lookup;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bloom::BloomFilter;

use crate::format::{
    read_data_entry, Stats, BLOOM_FILE, DATA_FILE, INDEX_FILE, MAX_KEY_BYTES, STATS_FILE,
    SUMMARY_FILE,
};
use crate::TableError;

/// Per-key read-hotness bookkeeping. Process-local, never persisted.
struct ReadStat {
    count: u64,
    last_read: Instant,
}

/// Reads a finalized run for point lookups.
///
/// Shared between the manager's live set and any in-flight snapshot via
/// `Arc`. When a compaction retires the run, [`mark_retired`] is set and the
/// on-disk directory is removed once the last `Arc` drops.
///
/// [`mark_retired`]: TableReader::mark_retired
pub struct TableReader {
    dir: PathBuf,
    /// Directory name of the run (e.g. `run-...-....sst`); the manager and
    /// manifest identify runs by this name.
    name: String,
    stats: Stats,
    bloom: BloomFilter,
    /// In-memory summary: (first key of page, byte offset into `index`).
    summary: Vec<(Vec<u8>, u64)>,
    data: Mutex<BufReader<File>>,
    index: Mutex<BufReader<File>>,
    data_len: u64,
    index_len: u64,
    read_stats: Mutex<HashMap<Vec<u8>, ReadStat>>,
    retired: AtomicBool,
}

impl TableReader {
    /// Opens a run directory, loading stats, bloom filter, and summary.
    ///
    /// Fails with [`TableError::Corrupt`] if the stats completion magic is
    /// missing (partially-written run) or any sidecar is malformed.
    pub fn open(dir: &Path) -> Result<Self, TableError> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TableError::Corrupt("run directory has no name".into()))?
            .to_string();

        let stats = Stats::read_from(&mut BufReader::new(File::open(dir.join(STATS_FILE))?))?;

        let bloom = BloomFilter::read_from(&mut BufReader::new(File::open(dir.join(BLOOM_FILE))?))?;

        let summary_bytes = fs::read(dir.join(SUMMARY_FILE))?;
        let summary = Self::parse_summary(&summary_bytes)?;
        if summary.is_empty() {
            return Err(TableError::Corrupt("run has an empty summary".into()));
        }

        let data_file = File::open(dir.join(DATA_FILE))?;
        let data_len = data_file.metadata()?.len();
        let index_file = File::open(dir.join(INDEX_FILE))?;
        let index_len = index_file.metadata()?.len();

        Ok(Self {
            dir: dir.to_path_buf(),
            name,
            stats,
            bloom,
            summary,
            data: Mutex::new(BufReader::new(data_file)),
            index: Mutex::new(BufReader::new(index_file)),
            data_len,
            index_len,
            read_stats: Mutex::new(HashMap::new()),
            retired: AtomicBool::new(false),
        })
    }

    fn parse_summary(bytes: &[u8]) -> Result<Vec<(Vec<u8>, u64)>, TableError> {
        let mut entries = Vec::new();
        let mut r = bytes;
        while !r.is_empty() {
            let key_len = r.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                return Err(TableError::Corrupt("summary key too long".into()));
            }
            let mut key = vec![0u8; key_len];
            r.read_exact(&mut key)?;
            let index_offset = r.read_u64::<LittleEndian>()?;
            entries.push((key, index_offset));
        }
        Ok(entries)
    }

    /// Point lookup for a single key.
    ///
    /// The bloom filter is consulted first; a negative means the key is
    /// **definitely not** in this run and no disk I/O happens. Otherwise the
    /// summary narrows the search to one index page, the page is scanned for
    /// the exact key, and a single data seek fetches the entry.
    ///
    /// Hits (live value *or* tombstone) bump the run's in-memory read
    /// counter and last-read timestamp, which feed compaction scoring.
    pub fn get(&self, key: &[u8]) -> Result<Lookup, TableError> {
        if !self.bloom.may_contain(key) {
            return Ok(Lookup::Missing);
        }

        // Page whose first key is the greatest one <= key.
        let pp = self.summary.partition_point(|(k, _)| k.as_slice() <= key);
        if pp == 0 {
            return Ok(Lookup::Missing); // key sorts before the first entry
        }
        let page_start = self.summary[pp - 1].1;
        let page_end = self
            .summary
            .get(pp)
            .map(|(_, off)| *off)
            .unwrap_or(self.index_len);

        let data_offset = match self.scan_index_page(key, page_start, page_end)? {
            Some(off) => off,
            None => return Ok(Lookup::Missing),
        };

        let (stored_key, entry) = {
            let mut data = self.data.lock();
            data.seek(SeekFrom::Start(data_offset))?;
            read_data_entry(&mut *data)?
        };

        if stored_key != key {
            return Err(TableError::Corrupt(format!(
                "index offset {} points at a different key",
                data_offset
            )));
        }

        self.record_hit(key);

        Ok(match entry.value {
            Some(v) => Lookup::Found(v),
            None => Lookup::Tombstone,
        })
    }

    /// Scans one index page for `key`, returning its data offset if present.
    fn scan_index_page(
        &self,
        key: &[u8],
        start: u64,
        end: u64,
    ) -> Result<Option<u64>, TableError> {
        let mut index = self.index.lock();
        index.seek(SeekFrom::Start(start))?;

        let mut pos = start;
        while pos < end {
            let key_len = index.read_u32::<LittleEndian>()? as usize;
            if key_len > MAX_KEY_BYTES {
                return Err(TableError::Corrupt("index key too long".into()));
            }
            let mut stored = vec![0u8; key_len];
            index.read_exact(&mut stored)?;
            let offset = index.read_u64::<LittleEndian>()?;
            pos += 4 + key_len as u64 + 8;

            match stored.as_slice().cmp(key) {
                std::cmp::Ordering::Equal => return Ok(Some(offset)),
                std::cmp::Ordering::Greater => return Ok(None), // page is sorted
                std::cmp::Ordering::Less => continue,
            }
        }
        Ok(None)
    }

    fn record_hit(&self, key: &[u8]) {
        let mut stats = self.read_stats.lock();
        let now = Instant::now();
        stats
            .entry(key.to_vec())
            .and_modify(|s| {
                s.count += 1;
                s.last_read = now;
            })
            .or_insert(ReadStat {
                count: 1,
                last_read: now,
            });
    }

    /// Time-decayed read-hotness score used by compaction bucket selection.
    ///
    /// Per tracked key: `100 * 0.9 / (1 + seconds_since_last_read) + count`,
    /// summed. Hot runs score high and get compacted sooner, keeping the
    /// read-critical paths shallow.
    #[must_use]
    pub fn read_hotness_score(&self) -> f64 {
        const INITIAL_SCORE: f64 = 100.0;
        const DECAY: f64 = 0.9;

        let stats = self.read_stats.lock();
        stats
            .values()
            .map(|s| {
                let since = s.last_read.elapsed().as_secs_f64();
                INITIAL_SCORE * DECAY / (1.0 + since) + s.count as f64
            })
            .sum()
    }

    /// Marks the run retired: its directory is deleted when the last shared
    /// handle drops.
    pub fn mark_retired(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    // ---- Accessors ----

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Data-segment size in bytes; the quantity compaction buckets by.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.data_len
    }

    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.stats.entry_count
    }

    #[must_use]
    pub fn tombstone_count(&self) -> u64 {
        self.stats.tombstone_count
    }

    #[must_use]
    pub fn min_key(&self) -> &[u8] {
        &self.stats.min_key
    }

    #[must_use]
    pub fn max_key(&self) -> &[u8] {
        &self.stats.max_key
    }

    #[must_use]
    pub fn birth_unix(&self) -> u64 {
        self.stats.birth_unix
    }

    /// Whether `key` falls inside this run's [min, max] key range.
    #[must_use]
    pub fn key_in_range(&self, key: &[u8]) -> bool {
        self.stats.min_key.as_slice() <= key && key <= self.stats.max_key.as_slice()
    }
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("name", &self.name)
            .field("entries", &self.stats.entry_count)
            .field("tombstones", &self.stats.tombstone_count)
            .field("size_bytes", &self.data_len)
            .finish()
    }
}

impl Drop for TableReader {
    fn drop(&mut self) {
        // Retired runs are deleted once nothing references them; the swap
        // that retired the run already rewrote the manifest.
        if self.retired.load(Ordering::SeqCst) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}
