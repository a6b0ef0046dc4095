//! Merge iterator over multiple [`RunScanner`]s.
//!
//! Produces `(key, ValueEntry)` pairs in ascending key order. When the same
//! key appears in multiple runs, only the entry with the **highest sequence
//! number** is emitted (newest wins).
//!
//! This is the core primitive for compaction: walk N input runs in sorted
//! order, deduplicate by sequence, and stream the result into a new run
//! writer. Given identical inputs the output is deterministic — ties on
//! sequence (which cannot occur between live runs) would resolve to the
//! lowest source index.

use memtable::ValueEntry;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{RunScanner, TableError};

/// A pending key from one scanner, used for heap-based merge ordering.
///
/// Only the `key` and `source` live in the heap — the matching
/// [`ValueEntry`] is parked in a per-source slot to keep heap entries
/// lightweight.
struct HeapEntry {
    key: Vec<u8>,
    /// Index into the `scanners` / `pending` arrays.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the *smallest* key first, so
        // reverse the key comparison. On tie, prefer the entry from the
        // source with the lower index (fixed, deterministic).
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Merges multiple runs into a single sorted, deduplicated stream.
pub struct MergeIterator {
    scanners: Vec<RunScanner>,
    /// Per-source: the entry whose key currently sits in the heap.
    pending: Vec<Option<ValueEntry>>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    /// Creates a merge iterator over the given scanners, priming the heap
    /// with each source's first entry.
    pub fn new(mut scanners: Vec<RunScanner>) -> Result<Self, TableError> {
        let mut pending: Vec<Option<ValueEntry>> = Vec::with_capacity(scanners.len());
        let mut heap = BinaryHeap::new();

        for (i, scanner) in scanners.iter_mut().enumerate() {
            match scanner.next_entry()? {
                Some((key, entry)) => {
                    heap.push(HeapEntry { key, source: i });
                    pending.push(Some(entry));
                }
                None => pending.push(None),
            }
        }

        Ok(Self {
            scanners,
            pending,
            heap,
        })
    }

    /// Pulls the next entry from `source`, refilling its heap slot.
    fn advance(&mut self, source: usize) -> Result<(), TableError> {
        if let Some((key, entry)) = self.scanners[source].next_entry()? {
            self.heap.push(HeapEntry { key, source });
            self.pending[source] = Some(entry);
        }
        Ok(())
    }

    /// Returns the next `(key, ValueEntry)` in sorted order, or `None` when
    /// all sources are exhausted.
    ///
    /// Duplicate keys (same key from multiple runs) are resolved by keeping
    /// only the entry with the highest sequence number.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, ValueEntry)>, TableError> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };

        let mut best = self.pending[top.source].take().ok_or_else(|| {
            TableError::Invariant("merge heap entry without a pending value".into())
        })?;
        self.advance(top.source)?;

        // Drain every other source holding the same key, keeping the
        // highest sequence number.
        while let Some(peek) = self.heap.peek() {
            if peek.key != top.key {
                break;
            }
            let dup = match self.heap.pop() {
                Some(d) => d,
                None => break,
            };
            if let Some(entry) = self.pending[dup.source].take() {
                if entry.seq > best.seq {
                    best = entry;
                }
            }
            self.advance(dup.source)?;
        }

        Ok(Some((top.key, best)))
    }

    /// Collects all remaining entries into a `Vec`. Test convenience.
    pub fn collect_all(&mut self) -> Result<Vec<(Vec<u8>, ValueEntry)>, TableError> {
        let mut result = Vec::new();
        while let Some(pair) = self.next_entry()? {
            result.push(pair);
        }
        Ok(result)
    }
}
