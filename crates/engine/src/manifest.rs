//! # Manifest — persistent record of the live run set
//!
//! Mirrors the manager's newest-first run list so the engine can
//! reconstruct its levels after a restart. One run directory name per line,
//! newest first:
//!
//! ```text
//! # DriftKV run manifest
//! run-00000000000000000042-1712000000123.sst
//! run-00000000000000000017-1711999990456.sst
//! ```
//!
//! Lines starting with `#` are comments. Empty lines are ignored.
//!
//! ## Crash safety
//!
//! The manifest is rewritten atomically: write to a `.tmp` file, fsync, then
//! rename over the existing manifest. It is saved while holding the engine's
//! manifest lock, in the same critical section as the manager mutation it
//! records, so the two never diverge.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Name of the manifest file within the SST directory.
pub const MANIFEST_FILENAME: &str = "MANIFEST";

/// Temporary file used during atomic manifest writes.
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

/// In-memory representation of the manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Path to the manifest file on disk.
    path: PathBuf,
    /// Run directory names, newest first.
    pub entries: Vec<String>,
}

impl Manifest {
    /// Loads an existing manifest from `sst_dir/MANIFEST`, or creates an
    /// empty one if the file does not exist.
    pub fn load_or_create(sst_dir: &Path) -> Result<Self> {
        let path = sst_dir.join(MANIFEST_FILENAME);

        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();

            // Skip empty lines and comments.
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if trimmed.contains(['/', '\\']) {
                return Err(EngineError::Corruption(format!(
                    "manifest line {}: run name contains a path separator: {}",
                    line_num + 1,
                    trimmed
                )));
            }

            entries.push(trimmed.to_string());
        }

        Ok(Self { path, entries })
    }

    /// Persists the current manifest state to disk.
    ///
    /// Writes to a temp file, fsyncs, then renames over the live manifest.
    pub fn save(&self) -> Result<()> {
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);

        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;

            writeln!(f, "# DriftKV run manifest")?;
            writeln!(f, "# newest first, one run directory per line")?;
            for entry in &self.entries {
                writeln!(f, "{}", entry)?;
            }

            f.flush()?;
            f.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Replaces the entry list wholesale (taken from a manager snapshot
    /// after an install or swap).
    pub fn set_runs(&mut self, names: Vec<String>) {
        self.entries = names;
    }

    /// Prepends a run (newest first). Does **not** save to disk.
    pub fn add_front(&mut self, name: String) {
        self.entries.insert(0, name);
    }

    /// Whether the manifest references `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e == name)
    }
}
