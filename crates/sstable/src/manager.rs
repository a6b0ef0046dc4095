//! Registry of live runs.
//!
//! The manager holds the runs newest-first behind an `Arc`-swapped vector.
//! Readers and the compactor take [`Snapshot`]s — cheap `Arc` clones that
//! stay valid while a swap commits, so a concurrent read sees either the
//! pre-swap or the post-swap run set, never a mix.
//!
//! Runs retired by a swap are marked so their directories are removed when
//! the last snapshot referencing them drops (close-on-last-drop ownership).

use memtable::Lookup;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

use crate::{TableError, TableReader};

/// An immutable view of the live runs at one moment, newest first.
#[derive(Clone)]
pub struct Snapshot {
    runs: Arc<Vec<Arc<TableReader>>>,
}

impl Snapshot {
    /// Walks the runs newest-first and returns the first definitive result.
    ///
    /// A tombstone is definitive: it shadows any older value, so the walk
    /// stops and reports it rather than falling through.
    pub fn read(&self, key: &[u8]) -> Result<Lookup, TableError> {
        for run in self.runs.iter() {
            match run.get(key)? {
                Lookup::Missing => continue,
                definitive => return Ok(definitive),
            }
        }
        Ok(Lookup::Missing)
    }

    /// Runs in newest-first order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TableReader>> {
        self.runs.iter()
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Arc<TableReader>> {
        self.runs.get(idx)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Thread-safe registry of the live runs.
pub struct TableManager {
    /// Live runs, newest first. Swapped wholesale so snapshots stay coherent.
    runs: RwLock<Arc<Vec<Arc<TableReader>>>>,
    /// Serializes compaction commits against each other.
    swap_lock: Mutex<()>,
}

impl TableManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::with_runs(Vec::new())
    }

    /// Creates a manager seeded with already-open runs (recovery path).
    /// `runs` must be ordered newest first.
    pub fn with_runs(runs: Vec<Arc<TableReader>>) -> Self {
        Self {
            runs: RwLock::new(Arc::new(runs)),
            swap_lock: Mutex::new(()),
        }
    }

    /// Atomically prepends a newly-built run (memtable flushes produce the
    /// newest data).
    pub fn install(&self, run: Arc<TableReader>) {
        let mut guard = self.runs.write();
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.push(run.clone());
        next.extend(guard.iter().cloned());
        *guard = Arc::new(next);
        debug!(run = run.name(), total = guard.len(), "installed run");
    }

    /// Atomically replaces `consumed` runs with `produced` ones.
    ///
    /// The produced runs take the position of the *oldest* consumed run —
    /// they hold merged (older) data, so every untouched newer run must keep
    /// shadowing them. Returns the retired readers, already marked for
    /// deletion-on-last-drop.
    ///
    /// Serialized against other swaps; fails with [`TableError::Invariant`]
    /// if any consumed name is not live.
    pub fn swap(
        &self,
        consumed: &[String],
        produced: Vec<Arc<TableReader>>,
    ) -> Result<Vec<Arc<TableReader>>, TableError> {
        let _commit = self.swap_lock.lock();

        let mut guard = self.runs.write();
        let current = guard.clone();

        let mut consumed_idx = Vec::with_capacity(consumed.len());
        for name in consumed {
            match current.iter().position(|r| r.name() == name) {
                Some(i) => consumed_idx.push(i),
                None => {
                    return Err(TableError::Invariant(format!(
                        "swap references unknown run {}",
                        name
                    )))
                }
            }
        }
        let oldest = match consumed_idx.iter().max() {
            Some(&i) => i,
            None => {
                return Err(TableError::Invariant(
                    "swap with no consumed runs".into(),
                ))
            }
        };

        let mut next = Vec::with_capacity(current.len());
        let mut retired = Vec::with_capacity(consumed_idx.len());
        for (i, run) in current.iter().enumerate() {
            if i == oldest {
                next.extend(produced.iter().cloned());
            }
            if consumed_idx.contains(&i) {
                run.mark_retired();
                retired.push(run.clone());
            } else {
                next.push(run.clone());
            }
        }

        *guard = Arc::new(next);
        debug!(
            consumed = consumed.len(),
            produced = produced.len(),
            total = guard.len(),
            "swapped runs"
        );
        Ok(retired)
    }

    /// Returns an immutable snapshot of the current live runs.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            runs: self.runs.read().clone(),
        }
    }

    /// Number of live runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }
}

impl Default for TableManager {
    fn default() -> Self {
        Self::new()
    }
}
