//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted record storage with a
//! sparse index.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (14 bytes)                                       │
//! │   Magic: "TRKV" (4) | Version: u16 (2) | Count: u64 (8) │
//! ├─────────────────────────────────────────────────────────┤
//! │ Data Region (variable)                                  │
//! │   [KeyLen: u32][ValLen: u32][Key][Value]                │
//! │   ... repeated for each record, sorted by key ...       │
//! │   (ValLen = u32::MAX means tombstone, no value bytes)   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Sparse Index Region (variable)                          │
//! │   [KeyLen: u32][Offset: u64][Key]                       │
//! │   ... one every `index_interval` records, plus the last │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (16 bytes)                                       │
//! │   IndexOffset: u64 (8) | DataCRC: u32 (4) | Count: u32  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers find the index through the footer, never by a fixed offset.

mod builder;
mod iterator;
mod reader;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub use builder::{SSTableBuilder, SSTableInfo};
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

use crate::error::{Result, TierError};
use crate::record::ValueRecord;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic bytes identifying a TierKV SSTable file
pub(crate) const MAGIC: &[u8; 4] = b"TRKV";

/// Current SSTable format version
pub(crate) const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + EntryCount (8) = 14 bytes
pub(crate) const HEADER_SIZE: u64 = 14;

/// Footer size: IndexOffset (8) + DataCRC (4) + IndexCount (4) = 16 bytes
pub(crate) const FOOTER_SIZE: u64 = 16;

/// Sentinel value indicating a tombstone (deleted key)
pub(crate) const TOMBSTONE_MARKER: u32 = u32::MAX;

/// Read one data-region record, returning it with its encoded size
pub(crate) fn read_record<R: Read>(reader: &mut R) -> Result<(ValueRecord, u64)> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;

    let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let mut key = vec![0u8; key_len];
    reader.read_exact(&mut key)?;
    let key = String::from_utf8(key)
        .map_err(|e| TierError::Storage(format!("SSTable key is not UTF-8: {}", e)))?;

    let mut size = 8 + key_len as u64;
    let record = if val_len == TOMBSTONE_MARKER {
        ValueRecord::tombstone(key)
    } else {
        let mut value = vec![0u8; val_len as usize];
        reader.read_exact(&mut value)?;
        size += val_len as u64;
        ValueRecord::put(key, value)
    };

    Ok((record, size))
}

// =============================================================================
// SSTable Handle
// =============================================================================

/// An open, immutable SSTable belonging to one level
///
/// Handles are shared through `Arc` by tree snapshots. Once a handle is
/// marked obsolete its file is removed when the last snapshot lets go.
pub struct SSTable {
    id: u64,
    level: usize,
    path: PathBuf,
    reader: SSTableReader,
    file_size: u64,
    obsolete: AtomicBool,
}

impl SSTable {
    /// Open an existing SSTable file
    pub fn open(path: &Path, id: u64, level: usize) -> Result<Self> {
        let reader = SSTableReader::open(path)?;
        let file_size = std::fs::metadata(path)?.len();

        Ok(Self {
            id,
            level,
            path: path.to_path_buf(),
            reader,
            file_size,
            obsolete: AtomicBool::new(false),
        })
    }

    /// Look up `key`; `Ok(None)` when this table has no record for it
    ///
    /// A tombstone is returned as a record with `deleted` set.
    pub fn get(&self, key: &str) -> Result<Option<ValueRecord>> {
        if !self.might_contain(key) {
            return Ok(None);
        }
        match self.reader.get(key) {
            Ok(record) => Ok(Some(record)),
            Err(TierError::KeyNotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sequential scan over every record, on a dedicated file handle
    pub fn iter(&self) -> Result<SSTableIterator> {
        SSTableIterator::open(&self.path, self.reader.index_offset())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn entry_count(&self) -> u64 {
        self.reader.entry_count()
    }

    pub fn min_key(&self) -> &str {
        self.reader.min_key().unwrap_or_default()
    }

    pub fn max_key(&self) -> &str {
        self.reader.max_key().unwrap_or_default()
    }

    /// Quick check if a key might be in this SSTable (range check)
    pub fn might_contain(&self, key: &str) -> bool {
        self.reader.might_contain(key)
    }

    /// Whether this table's key range intersects `[min, max]`
    pub fn overlaps(&self, min: &str, max: &str) -> bool {
        self.min_key() <= max && min <= self.max_key()
    }

    /// Recompute the data checksum
    pub fn verify(&self) -> Result<()> {
        self.reader.verify()
    }

    /// Schedule the file for removal once no snapshot references it
    pub(crate) fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::SeqCst);
    }
}

impl Drop for SSTable {
    fn drop(&mut self) {
        if !self.obsolete.load(Ordering::SeqCst) {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(id = self.id, level = self.level, "Removed obsolete SSTable"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove obsolete SSTable"
            ),
        }
    }
}

impl std::fmt::Debug for SSTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTable")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("entries", &self.entry_count())
            .field("min_key", &self.min_key())
            .field("max_key", &self.max_key())
            .field("file_size", &self.file_size)
            .finish()
    }
}
