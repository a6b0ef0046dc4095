//! Streaming run writer.
//!
//! Entries arrive in ascending key order (from a sealed memtable or a merge)
//! and are appended straight to the `data` file while the index, summary
//! stride, and bloom hashes accumulate in memory. `finish()` writes the
//! sidecars, fsyncs everything, and atomically renames the `.sst.tmp`
//! directory into place — the rename plus the stats magic form the
//! completion barrier, so a crash at any earlier point leaves only debris
//! that startup cleanup removes.

use byteorder::{LittleEndian, WriteBytesExt};
use memtable::ValueEntry;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bloom::BloomFilter;

use crate::format::{
    write_data_entry, Stats, BLOOM_FILE, DATA_FILE, INDEX_FILE, RUN_EXT, STATS_FILE, SUMMARY_FILE,
    TMP_EXT,
};
use crate::TableError;

/// Sizing knobs for the sidecars, taken from the engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct TableOptions {
    /// Bloom filter bits per key.
    pub bloom_bits_per_key: usize,
    /// Bloom filter hash count.
    pub bloom_hashes: u8,
    /// One summary entry per this many index entries.
    pub summary_stride: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            bloom_bits_per_key: 10,
            bloom_hashes: 2,
            summary_stride: 64,
        }
    }
}

/// Builds one run from a sorted entry stream.
pub struct TableWriter {
    tmp_dir: PathBuf,
    final_dir: PathBuf,
    data: BufWriter<File>,
    data_offset: u64,
    /// Buffered index: (key, data offset), flushed to disk at finish.
    index: Vec<(Vec<u8>, u64)>,
    /// Bloom hash pairs, one per key; the filter itself is sized and built
    /// once the final entry count is known.
    hashes: Vec<(u64, u64)>,
    entry_count: u64,
    tombstone_count: u64,
    opts: TableOptions,
}

impl TableWriter {
    /// Creates `<dir>/<name>.sst.tmp/` and opens the data file inside it.
    ///
    /// `name` is the run's stem (e.g. `run-00000000000000000007-1712`);
    /// the finalized directory will be `<dir>/<name>.sst`.
    pub fn create(dir: &Path, name: &str, opts: TableOptions) -> Result<Self, TableError> {
        let tmp_dir = dir.join(format!("{}.{}", name, TMP_EXT));
        let final_dir = dir.join(format!("{}.{}", name, RUN_EXT));

        // A stale tmp dir from an interrupted build is dead weight; replace it.
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        let data = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(tmp_dir.join(DATA_FILE))?;

        Ok(Self {
            tmp_dir,
            final_dir,
            data: BufWriter::new(data),
            data_offset: 0,
            index: Vec::new(),
            hashes: Vec::new(),
            entry_count: 0,
            tombstone_count: 0,
            opts,
        })
    }

    /// Appends one entry. Keys must arrive in strictly ascending order.
    pub fn add(&mut self, key: &[u8], entry: &ValueEntry) -> Result<(), TableError> {
        if let Some((last, _)) = self.index.last() {
            if last.as_slice() >= key {
                return Err(TableError::Corrupt(format!(
                    "entries out of order: {:?} after {:?}",
                    key, last
                )));
            }
        }

        let offset = self.data_offset;
        self.data_offset += write_data_entry(&mut self.data, key, entry)?;

        self.index.push((key.to_vec(), offset));
        self.hashes.push(bloom::hash_pair(key));

        self.entry_count += 1;
        if entry.value.is_none() {
            self.tombstone_count += 1;
        }
        Ok(())
    }

    /// Number of entries added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Finalizes the run: index, summary, bloom, stats (magic last), fsync,
    /// rename into place. Returns the final run directory.
    ///
    /// An empty run is an error ([`TableError::Empty`]); its tmp directory is
    /// removed before returning.
    pub fn finish(mut self) -> Result<PathBuf, TableError> {
        if self.index.is_empty() {
            let _ = fs::remove_dir_all(&self.tmp_dir);
            return Err(TableError::Empty);
        }

        // data first: everything else points into it
        self.data.flush()?;
        self.data.get_ref().sync_all()?;

        // index + summary in one pass over the buffered entries
        let mut index_file = BufWriter::new(File::create(self.tmp_dir.join(INDEX_FILE))?);
        let mut summary_file = BufWriter::new(File::create(self.tmp_dir.join(SUMMARY_FILE))?);

        let stride = self.opts.summary_stride.max(1);
        let mut index_offset = 0u64;
        for (i, (key, data_offset)) in self.index.iter().enumerate() {
            if i % stride == 0 {
                summary_file.write_u32::<LittleEndian>(key.len() as u32)?;
                summary_file.write_all(key)?;
                summary_file.write_u64::<LittleEndian>(index_offset)?;
            }

            index_file.write_u32::<LittleEndian>(key.len() as u32)?;
            index_file.write_all(key)?;
            index_file.write_u64::<LittleEndian>(*data_offset)?;
            index_offset += 4 + key.len() as u64 + 8;
        }

        index_file.flush()?;
        index_file.get_ref().sync_all()?;
        summary_file.flush()?;
        summary_file.get_ref().sync_all()?;

        // bloom, sized from the final entry count
        let mut filter = BloomFilter::sized_for(
            self.entry_count as usize,
            self.opts.bloom_bits_per_key,
            self.opts.bloom_hashes,
        );
        for pair in &self.hashes {
            filter.insert_pair(*pair);
        }
        let mut bloom_file = BufWriter::new(File::create(self.tmp_dir.join(BLOOM_FILE))?);
        filter.write_to(&mut bloom_file)?;
        bloom_file.flush()?;
        bloom_file.get_ref().sync_all()?;

        // stats last; its trailing magic is the completion marker
        let birth_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let stats = Stats {
            entry_count: self.entry_count,
            tombstone_count: self.tombstone_count,
            min_key: self.index.first().map(|(k, _)| k.clone()).unwrap_or_default(),
            max_key: self.index.last().map(|(k, _)| k.clone()).unwrap_or_default(),
            birth_unix,
        };
        let mut stats_file = BufWriter::new(File::create(self.tmp_dir.join(STATS_FILE))?);
        stats.write_to(&mut stats_file)?;
        stats_file.flush()?;
        stats_file.get_ref().sync_all()?;

        // Atomically move into place
        fs::rename(&self.tmp_dir, &self.final_dir)?;

        Ok(self.final_dir.clone())
    }

    /// Abandons the run, removing the tmp directory.
    pub fn discard(self) {
        let _ = fs::remove_dir_all(&self.tmp_dir);
    }
}
