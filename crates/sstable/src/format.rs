//! Sidecar file names, wire constants, and the shared entry/stats codecs.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memtable::ValueEntry;
use std::io::{Read, Write};
use std::path::Path;

use crate::TableError;

/// Sibling files inside a run directory.
pub const DATA_FILE: &str = "data";
pub const INDEX_FILE: &str = "index";
pub const SUMMARY_FILE: &str = "summary";
pub const BLOOM_FILE: &str = "bloom";
pub const STATS_FILE: &str = "stats";

/// Extension of a live run directory.
pub const RUN_EXT: &str = "sst";
/// Extension of a run directory still being built.
pub const TMP_EXT: &str = "sst.tmp";

/// `value_len` sentinel marking a tombstone in the data file.
pub const TOMBSTONE_SENTINEL: u32 = u32::MAX;

/// Completion marker written as the final 8 bytes of `stats`.
/// ASCII "DKVRUN01".
pub const STATS_MAGIC: u64 = 0x3130_4e55_5256_4b44;

/// Largest key the codecs will allocate for (64 KiB).
pub const MAX_KEY_BYTES: usize = 64 * 1024;
/// Largest value the codecs will allocate for (10 MiB).
pub const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

/// Serializes one data entry; returns the number of bytes written.
pub fn write_data_entry<W: Write>(
    w: &mut W,
    key: &[u8],
    entry: &ValueEntry,
) -> Result<u64, TableError> {
    w.write_u32::<LittleEndian>(key.len() as u32)?;
    w.write_all(key)?;

    let mut written = 4 + key.len() as u64;
    match &entry.value {
        Some(v) => {
            w.write_u32::<LittleEndian>(v.len() as u32)?;
            w.write_all(v)?;
            written += 4 + v.len() as u64;
        }
        None => {
            w.write_u32::<LittleEndian>(TOMBSTONE_SENTINEL)?;
            written += 4;
        }
    }

    w.write_u64::<LittleEndian>(entry.seq)?;
    Ok(written + 8)
}

/// Parses one data entry from the current position of `r`.
///
/// The caller bounds the read by the data file length; EOF mid-entry is
/// corruption, not a torn tail — runs are finalized atomically.
pub fn read_data_entry<R: Read>(r: &mut R) -> Result<(Vec<u8>, ValueEntry), TableError> {
    let key_len = r.read_u32::<LittleEndian>()? as usize;
    if key_len > MAX_KEY_BYTES {
        return Err(TableError::Corrupt(format!(
            "data entry key_len {} exceeds maximum {}",
            key_len, MAX_KEY_BYTES
        )));
    }
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;

    let val_len = r.read_u32::<LittleEndian>()?;
    let value = if val_len == TOMBSTONE_SENTINEL {
        None
    } else {
        let val_len = val_len as usize;
        if val_len > MAX_VALUE_BYTES {
            return Err(TableError::Corrupt(format!(
                "data entry val_len {} exceeds maximum {}",
                val_len, MAX_VALUE_BYTES
            )));
        }
        let mut val = vec![0u8; val_len];
        r.read_exact(&mut val)?;
        Some(val)
    };

    let seq = r.read_u64::<LittleEndian>()?;
    Ok((key, ValueEntry { seq, value }))
}

/// Immutable per-run statistics, persisted as the `stats` sidecar.
///
/// Runtime read counters live in [`crate::TableReader`], not here — they are
/// process-local and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub entry_count: u64,
    pub tombstone_count: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    /// Unix seconds at which the run was finalized.
    pub birth_unix: u64,
}

impl Stats {
    /// Writes the stats payload followed by the completion magic.
    ///
    /// The magic goes last so a crash mid-write leaves a detectably
    /// incomplete run.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), TableError> {
        w.write_u64::<LittleEndian>(self.entry_count)?;
        w.write_u64::<LittleEndian>(self.tombstone_count)?;
        w.write_u32::<LittleEndian>(self.min_key.len() as u32)?;
        w.write_all(&self.min_key)?;
        w.write_u32::<LittleEndian>(self.max_key.len() as u32)?;
        w.write_all(&self.max_key)?;
        w.write_u64::<LittleEndian>(self.birth_unix)?;
        w.write_u64::<LittleEndian>(STATS_MAGIC)?;
        Ok(())
    }

    /// Reads and validates a stats sidecar, including the trailing magic.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, TableError> {
        let entry_count = r.read_u64::<LittleEndian>()?;
        let tombstone_count = r.read_u64::<LittleEndian>()?;

        let min_key_len = r.read_u32::<LittleEndian>()? as usize;
        if min_key_len > MAX_KEY_BYTES {
            return Err(TableError::Corrupt("stats min_key too long".into()));
        }
        let mut min_key = vec![0u8; min_key_len];
        r.read_exact(&mut min_key)?;

        let max_key_len = r.read_u32::<LittleEndian>()? as usize;
        if max_key_len > MAX_KEY_BYTES {
            return Err(TableError::Corrupt("stats max_key too long".into()));
        }
        let mut max_key = vec![0u8; max_key_len];
        r.read_exact(&mut max_key)?;

        let birth_unix = r.read_u64::<LittleEndian>()?;

        let magic = r.read_u64::<LittleEndian>()?;
        if magic != STATS_MAGIC {
            return Err(TableError::Corrupt(format!(
                "stats magic mismatch: {:#018x}",
                magic
            )));
        }

        Ok(Self {
            entry_count,
            tombstone_count,
            min_key,
            max_key,
            birth_unix,
        })
    }
}

/// Returns `true` if `dir` looks like a fully-finalized run: the stats
/// sidecar exists and ends with the completion magic.
pub fn is_complete_run(dir: &Path) -> bool {
    let stats_path = dir.join(STATS_FILE);
    let Ok(bytes) = std::fs::read(&stats_path) else {
        return false;
    };
    if bytes.len() < 8 {
        return false;
    }
    match bytes[bytes.len() - 8..].try_into() {
        Ok(tail) => u64::from_le_bytes(tail) == STATS_MAGIC,
        Err(_) => false,
    }
}
