//! Engine configuration with sensible defaults.

use sstable::TableOptions;
use std::path::PathBuf;
use std::time::Duration;
use wal::SyncPolicy;

/// Tunables for one engine instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory; WAL segments live in `<data_dir>/wal`, runs in
    /// `<data_dir>/sst`.
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------
    // Memtable
    // -------------------------------------------------------------------
    /// Approximate byte size at which the active memtable is sealed and
    /// handed to the flush worker.
    pub memtable_max_bytes: usize,

    /// Largest accepted key.
    pub max_key_bytes: usize,

    /// Largest accepted value.
    pub max_value_bytes: usize,

    // -------------------------------------------------------------------
    // WAL
    // -------------------------------------------------------------------
    /// How often WAL appends are fsynced.
    pub wal_sync_policy: SyncPolicy,

    // -------------------------------------------------------------------
    // Flush worker
    // -------------------------------------------------------------------
    /// Bounded queue depth between sealing and the flush worker. Writers
    /// block when it is full, bounding unflushed memory to
    /// `memtable_max_bytes * (capacity + 1)`.
    pub flush_queue_capacity: usize,

    // -------------------------------------------------------------------
    // Compaction
    // -------------------------------------------------------------------
    /// Background wake period.
    pub compaction_period: Duration,

    /// Minimum runs a size bucket needs before it qualifies.
    pub compaction_min_threshold: usize,

    /// Bucket tolerance band: a run joins a bucket when its size is within
    /// `[first * lo, first * hi]` of the bucket's first (smallest) run.
    pub compaction_size_tolerance: (f64, f64),

    /// Live-run count that fires an explicit compaction trigger.
    pub compaction_high_water: usize,

    /// Tombstones with a sequence at or below this may be collected once no
    /// older run can still hold the key.
    pub tombstone_gc_before_seq: u64,

    // -------------------------------------------------------------------
    // Run sidecars
    // -------------------------------------------------------------------
    /// Bloom filter bits per key.
    pub bloom_bits_per_key: usize,

    /// Bloom filter hash count.
    pub bloom_hashes: u8,

    /// One summary entry per this many index entries.
    pub summary_stride: usize,
}

impl Config {
    /// Defaults rooted at `data_dir`.
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Directory holding WAL segments.
    #[must_use]
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    /// Directory holding run directories and the manifest.
    #[must_use]
    pub fn sst_dir(&self) -> PathBuf {
        self.data_dir.join("sst")
    }

    /// Sidecar sizing handed to run writers.
    #[must_use]
    pub fn table_options(&self) -> TableOptions {
        TableOptions {
            bloom_bits_per_key: self.bloom_bits_per_key,
            bloom_hashes: self.bloom_hashes,
            summary_stride: self.summary_stride,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./driftkv_data"),
            memtable_max_bytes: 1024 * 1024, // 1 MiB
            max_key_bytes: 64 * 1024,        // 64 KiB
            max_value_bytes: 10 * 1024 * 1024, // 10 MiB
            wal_sync_policy: SyncPolicy::EveryRecord,
            flush_queue_capacity: 1,
            compaction_period: Duration::from_secs(5 * 60),
            compaction_min_threshold: 4,
            compaction_size_tolerance: (0.5, 1.5),
            compaction_high_water: 8,
            tombstone_gc_before_seq: u64::MAX,
            bloom_bits_per_key: 10,
            bloom_hashes: 2,
            summary_stride: 64,
        }
    }
}
