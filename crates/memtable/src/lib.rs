//! # Memtable — in-memory ordered write buffer
//!
//! Every mutation lands here after it is made durable in the WAL. The map is
//! ordered by unsigned-lexicographic key comparison so a sealed memtable can
//! be streamed straight into a sorted on-disk run.
//!
//! Deletes are **not** removals: they insert a tombstone entry so the
//! deletion shadows any older value living in on-disk runs. A lookup must
//! therefore distinguish "tombstone here" from "never heard of this key" —
//! callers stop probing older runs on a tombstone.
//!
//! The memtable tracks an approximate byte size (`len(key) + len(value)` per
//! live entry, one byte for a tombstone marker) and reports when an insert
//! pushes it past the configured maximum. Once `seal()` is called the table
//! is immutable; further mutations fail with [`Sealed`].

use std::collections::BTreeMap;

use thiserror::Error;

/// Approximate bytes a tombstone contributes to the size accounting.
pub const TOMBSTONE_MARKER_SIZE: usize = 1;

/// ValueEntry stores the sequence number and the optional value.
/// `value == None` signifies a tombstone (delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueEntry {
    pub seq: u64,
    pub value: Option<Vec<u8>>,
}

/// Result of a point lookup.
///
/// `Tombstone` is deliberately distinct from `Missing`: a tombstone ends the
/// search across older runs, absence lets it continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Vec<u8>),
    Tombstone,
    Missing,
}

/// Outcome of a successful `put`/`delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Byte-size delta this mutation added to the accounting (may be
    /// negative when a long value is overwritten by a short one).
    pub delta: isize,
    /// True when the post-insert size reached the configured maximum and the
    /// table should be sealed and flushed.
    pub needs_flush: bool,
}

/// Mutation attempted on a sealed memtable.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("memtable is sealed")]
pub struct Sealed;

#[derive(Debug)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, ValueEntry>,
    approx_size: usize,
    max_size: usize,
    sealed: bool,
}

impl Memtable {
    /// Creates an empty, writable memtable that signals `needs_flush` once
    /// its approximate size reaches `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            map: BTreeMap::new(),
            approx_size: 0,
            max_size,
            sealed: false,
        }
    }

    /// Inserts or overwrites a key with a sequence number.
    ///
    /// Entries carrying a sequence not newer than the stored one are ignored
    /// (WAL replay may re-apply records).
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>, seq: u64) -> Result<Applied, Sealed> {
        self.apply(key, Some(value), seq)
    }

    /// Inserts a tombstone for the key.
    ///
    /// The key is *not* removed: the tombstone must survive so it can shadow
    /// older values in on-disk runs.
    pub fn delete(&mut self, key: Vec<u8>, seq: u64) -> Result<Applied, Sealed> {
        self.apply(key, None, seq)
    }

    fn apply(
        &mut self,
        key: Vec<u8>,
        value: Option<Vec<u8>>,
        seq: u64,
    ) -> Result<Applied, Sealed> {
        if self.sealed {
            return Err(Sealed);
        }

        let new_payload = value.as_ref().map_or(TOMBSTONE_MARKER_SIZE, |v| v.len());

        let delta: isize = match self.map.get(&key) {
            Some(old) if old.seq >= seq => {
                // stale replay; size unchanged
                return Ok(Applied {
                    delta: 0,
                    needs_flush: self.approx_size >= self.max_size,
                });
            }
            Some(old) => {
                let old_payload = old.value.as_ref().map_or(TOMBSTONE_MARKER_SIZE, |v| v.len());
                new_payload as isize - old_payload as isize
            }
            None => (key.len() + new_payload) as isize,
        };

        self.approx_size = (self.approx_size as isize + delta).max(0) as usize;
        self.map.insert(key, ValueEntry { seq, value });

        Ok(Applied {
            delta,
            needs_flush: self.approx_size >= self.max_size,
        })
    }

    /// Point lookup distinguishing live value, tombstone, and absence.
    pub fn get(&self, key: &[u8]) -> Lookup {
        match self.map.get(key) {
            Some(ValueEntry { value: Some(v), .. }) => Lookup::Found(v.clone()),
            Some(ValueEntry { value: None, .. }) => Lookup::Tombstone,
            None => Lookup::Missing,
        }
    }

    /// Borrowing lookup used by the flush and read paths.
    pub fn entry(&self, key: &[u8]) -> Option<&ValueEntry> {
        self.map.get(key)
    }

    /// Ordered iterator over entries (key, ValueEntry), ascending by key.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &ValueEntry)> {
        self.map.iter()
    }

    /// Marks the memtable immutable. Idempotent.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of tombstone entries currently held.
    pub fn tombstone_count(&self) -> usize {
        self.map.values().filter(|e| e.value.is_none()).count()
    }
}
