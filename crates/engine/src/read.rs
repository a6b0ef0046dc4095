//! Read path: `get()`.
//!
//! A lookup snapshots three things under a brief shared lock — the active
//! memtable handle, the sealed list, and the run set — then probes them
//! newest to oldest without holding any engine-wide lock. The first
//! definitive answer wins; a tombstone anywhere terminates the search and
//! reports not-found, never falling through to older data.

use memtable::Lookup;

use crate::error::Result;
use crate::Engine;

impl Engine {
    /// Looks up a key, returning `Some(value)` if it is live.
    ///
    /// Probes the active memtable, then sealed-but-unflushed memtables
    /// newest-first, then on-disk runs newest-first. A `put` acknowledged
    /// before this call is always visible (read-your-writes within one
    /// engine instance).
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let (active, sealed) = {
            let state = self.shared.state.read();
            (state.active.clone(), state.sealed.clone())
        };
        let runs = self.shared.tables.snapshot();

        match active.read().get(key) {
            Lookup::Found(v) => return Ok(Some(v)),
            Lookup::Tombstone => return Ok(None),
            Lookup::Missing => {}
        }

        for mem in &sealed {
            match mem.read().get(key) {
                Lookup::Found(v) => return Ok(Some(v)),
                Lookup::Tombstone => return Ok(None),
                Lookup::Missing => {}
            }
        }

        match runs.read(key)? {
            Lookup::Found(v) => Ok(Some(v)),
            Lookup::Tombstone | Lookup::Missing => Ok(None),
        }
    }
}
