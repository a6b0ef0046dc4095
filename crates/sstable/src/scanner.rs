//! Forward scanner over a run's data segment.
//!
//! Yields entries in ascending key order; the compactor drives one scanner
//! per input run. The scanner owns its file handle — it never reaches back
//! into reader or manager state, so it stays valid for as long as the run
//! directory exists.

use memtable::ValueEntry;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::format::{read_data_entry, DATA_FILE};
use crate::TableError;

/// Sequential reader of a run's sorted data file.
pub struct RunScanner {
    data: BufReader<File>,
    data_len: u64,
    pos: u64,
    /// Entry parsed ahead for `has_next`/`peek_key`.
    peeked: Option<(Vec<u8>, ValueEntry)>,
}

impl RunScanner {
    /// Opens a scanner positioned at the first entry of the run in `dir`.
    pub fn open(dir: &Path) -> Result<Self, TableError> {
        let file = File::open(dir.join(DATA_FILE))?;
        let data_len = file.metadata()?.len();
        Ok(Self {
            data: BufReader::new(file),
            data_len,
            pos: 0,
            peeked: None,
        })
    }

    fn fill_peek(&mut self) -> Result<(), TableError> {
        if self.peeked.is_none() && self.pos < self.data_len {
            let before = self.pos;
            let (key, entry) = read_data_entry(&mut self.data)?;
            self.pos = before
                + 4
                + key.len() as u64
                + 4
                + entry.value.as_ref().map_or(0, |v| v.len() as u64)
                + 8;
            self.peeked = Some((key, entry));
        }
        Ok(())
    }

    /// Whether another entry is available.
    pub fn has_next(&mut self) -> Result<bool, TableError> {
        self.fill_peek()?;
        Ok(self.peeked.is_some())
    }

    /// Returns the next key without advancing.
    pub fn peek_key(&mut self) -> Result<Option<&[u8]>, TableError> {
        self.fill_peek()?;
        Ok(self.peeked.as_ref().map(|(k, _)| k.as_slice()))
    }

    /// Returns the next entry and advances.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, ValueEntry)>, TableError> {
        self.fill_peek()?;
        Ok(self.peeked.take())
    }
}
