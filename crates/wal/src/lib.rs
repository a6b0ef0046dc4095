//! # WAL — Write-Ahead Log
//!
//! Provides crash-safe durability for the DriftKV storage engine.
//!
//! Every mutation (`PUT` or `DELETE`) is serialized into a binary record and
//! appended to the active WAL segment **before** the corresponding in-memory
//! update. On restart the segments are replayed to reconstruct the memtable,
//! guaranteeing that no acknowledged write is lost.
//!
//! ## Binary Record Format
//!
//! ```text
//! [op: u8][key_len: u32 LE][key][val_len: u32 LE][value][crc32: u32 LE]
//! ```
//!
//! `op` is 1 for PUT, 2 for DELETE; the `val_len`/`value` fields are present
//! only for PUT. The trailing CRC32 covers every preceding byte of the
//! record and detects in-place corruption.
//!
//! ## Torn tails
//!
//! A crash mid-append leaves a partial record at the end of the segment.
//! Replay treats *any* EOF inside a record — including inside the trailing
//! CRC — as a clean end of log: every fully-framed record before it is
//! yielded and no error is raised. A CRC mismatch, by contrast, means the
//! bytes were altered rather than cut short and aborts replay with
//! [`WalError::Corrupt`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{SyncPolicy, WalReader, WalRecord, WalWriter};
//!
//! let mut w = WalWriter::create("wal-0.log", SyncPolicy::EveryRecord).unwrap();
//! w.append(&WalRecord::Put {
//!     key: b"hello".to_vec(),
//!     value: b"world".to_vec(),
//! }).unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("wal-0.log").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

/// Op code for a key-value insertion.
pub const OP_PUT: u8 = 1;
/// Op code for a deletion.
pub const OP_DELETE: u8 = 2;

/// Largest key replay will allocate for (64 KiB).
const MAX_KEY_BYTES: usize = 64 * 1024;
/// Largest value replay will allocate for (64 MiB safety cap).
const MAX_VALUE_BYTES: usize = 64 * 1024 * 1024;

/// A single WAL record representing either a key-value insertion or a
/// deletion.
///
/// Records carry no sequence number: the engine assigns sequences under its
/// writer lock, and replay re-assigns them in log order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion.
    Put {
        /// The lookup key.
        key: Vec<u8>,
        /// The payload value.
        value: Vec<u8>,
    },
    /// A key deletion (tombstone).
    Del {
        /// The key to delete.
        key: Vec<u8>,
    },
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or contained an unknown op code.
    #[error("corrupt record")]
    Corrupt,
}

/// When appends are made durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// `fsync` after every record (default; safest).
    EveryRecord,
    /// `fsync` once per N appended records.
    EveryN(u32),
    /// `fsync` when at least this many milliseconds passed since the last.
    EveryMillis(u64),
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy::EveryRecord
    }
}

/// Append-only WAL segment writer.
///
/// Records are serialized into a reusable in-memory buffer, CRC-stamped, and
/// written to the file in a single `write_all` call. Durability follows the
/// configured [`SyncPolicy`]; `sync_to_disk` forces it at any point.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    policy: SyncPolicy,
    /// Records appended since the last fsync.
    unsynced: u32,
    last_sync: Instant,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL segment in append mode.
    pub fn create<P: AsRef<Path>>(path: P, policy: SyncPolicy) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file,
            path,
            policy,
            unsynced: 0,
            last_sync: Instant::now(),
            buf: Vec::with_capacity(256),
        })
    }

    /// Returns the path of the active segment.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes `record` and appends it to the active segment.
    ///
    /// When this returns `Ok`, the record is durable under the configured
    /// sync policy (immediately for [`SyncPolicy::EveryRecord`]).
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        self.buf.clear();

        match record {
            WalRecord::Put { key, value } => {
                self.buf.write_u8(OP_PUT)?;
                self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
                self.buf.extend_from_slice(key);
                self.buf.write_u32::<LittleEndian>(value.len() as u32)?;
                self.buf.extend_from_slice(value);
            }
            WalRecord::Del { key } => {
                self.buf.write_u8(OP_DELETE)?;
                self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
                self.buf.extend_from_slice(key);
            }
        }

        // CRC over everything framed so far, appended last.
        let mut hasher = Crc32::new();
        hasher.update(&self.buf);
        let crc = hasher.finalize();
        self.buf.write_u32::<LittleEndian>(crc)?;

        // Single write call for the entire frame
        self.file.write_all(&self.buf)?;
        self.file.flush()?;

        self.unsynced += 1;
        match self.policy {
            SyncPolicy::EveryRecord => self.sync_to_disk()?,
            SyncPolicy::EveryN(n) => {
                if self.unsynced >= n.max(1) {
                    self.sync_to_disk()?;
                }
            }
            SyncPolicy::EveryMillis(ms) => {
                if self.last_sync.elapsed().as_millis() as u64 >= ms {
                    self.sync_to_disk()?;
                }
            }
        }

        Ok(())
    }

    /// Forces all appended records to disk via `sync_all()`.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.sync_all()?;
        self.unsynced = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Begins a new segment at `new_path`, leaving the old segment on disk.
    ///
    /// The caller ties rotation to memtable sealing: the old segment may be
    /// deleted only after the run covering its mutations is durably
    /// installed. The old segment is synced before the switch.
    pub fn rotate<P: AsRef<Path>>(&mut self, new_path: P) -> Result<(), WalError> {
        self.sync_to_disk()?;

        let new_path = new_path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&new_path)?;

        self.file = file;
        self.path = new_path;
        self.unsynced = 0;
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Flushes and syncs any buffered records, then releases the file.
    pub fn close(mut self) -> Result<(), WalError> {
        self.sync_to_disk()
    }
}

/// Sequential WAL reader that yields valid records.
///
/// The reader is generic over any `Read` implementor, allowing it to be used
/// with real files (`WalReader<File>`) or in-memory buffers for testing.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL segment for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

/// Internal: result of reading one field that may hit a torn tail.
macro_rules! read_or_tail {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(WalError::Io(e)),
        }
    };
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    ///
    /// Useful for unit tests that supply an in-memory buffer
    /// (e.g., `Cursor<Vec<u8>>`).
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid record, calling `apply` for each one in order.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** (no more bytes) -> returns `Ok(())`.
    /// - **Truncated tail** (partial record at end, e.g., crash mid-write) ->
    ///   returns `Ok(())` after yielding all complete records before it.
    /// - **CRC mismatch** -> returns `Err(WalError::Corrupt)`.
    /// - **Unknown op code / absurd length** -> returns `Err(WalError::Corrupt)`.
    /// - **I/O error** -> returns `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        // Raw record bytes accumulate here so the CRC can be re-computed.
        let mut frame = Vec::with_capacity(256);

        loop {
            let op = match self.rdr.read_u8() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            if op != OP_PUT && op != OP_DELETE {
                return Err(WalError::Corrupt);
            }

            frame.clear();
            frame.push(op);

            let key_len = read_or_tail!(self.rdr.read_u32::<LittleEndian>()) as usize;
            if key_len > MAX_KEY_BYTES {
                return Err(WalError::Corrupt);
            }
            frame.extend_from_slice(&(key_len as u32).to_le_bytes());

            let mut key = vec![0u8; key_len];
            read_or_tail!(self.rdr.read_exact(&mut key));
            frame.extend_from_slice(&key);

            let value = if op == OP_PUT {
                let val_len = read_or_tail!(self.rdr.read_u32::<LittleEndian>()) as usize;
                if val_len > MAX_VALUE_BYTES {
                    return Err(WalError::Corrupt);
                }
                frame.extend_from_slice(&(val_len as u32).to_le_bytes());

                let mut val = vec![0u8; val_len];
                read_or_tail!(self.rdr.read_exact(&mut val));
                frame.extend_from_slice(&val);
                Some(val)
            } else {
                None
            };

            let stored_crc = read_or_tail!(self.rdr.read_u32::<LittleEndian>());

            let mut hasher = Crc32::new();
            hasher.update(&frame);
            if hasher.finalize() != stored_crc {
                return Err(WalError::Corrupt);
            }

            match value {
                Some(value) => apply(WalRecord::Put { key, value }),
                None => apply(WalRecord::Del { key }),
            }
        }
    }
}

#[cfg(test)]
mod tests;
