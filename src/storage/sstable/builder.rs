//! SSTable Builder
//!
//! Writes sorted records to a new SSTable file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TierError};
use crate::record::ValueRecord;

use super::{HEADER_SIZE, MAGIC, TOMBSTONE_MARKER, VERSION};

/// Summary of a finished SSTable file
#[derive(Debug, Clone)]
pub struct SSTableInfo {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of records in this SSTable
    pub entry_count: u64,
    /// Smallest key (for range filtering)
    pub min_key: String,
    /// Largest key (for range filtering)
    pub max_key: String,
    /// Number of sparse index entries
    pub index_entries: u32,
    /// File size in bytes
    pub file_size: u64,
}

/// Builder for creating new SSTables from sorted records
pub struct SSTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Records between sparse index entries
    index_interval: usize,
    /// Number of records written
    entry_count: u64,
    /// Current write position (for index)
    current_offset: u64,
    /// Sparse index: key → file offset of record
    index: Vec<(String, u64)>,
    /// First key and position of the latest record
    min_key: Option<String>,
    last: Option<(String, u64)>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes header immediately; call `add()` in strictly increasing key
    /// order, then `finish()` to write index and footer.
    pub fn new(path: &Path, index_interval: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);

        // Write header (entry_count placeholder, will be updated in finish)
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            index_interval: index_interval.max(1),
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            min_key: None,
            last: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add a record (keys must be strictly increasing)
    pub fn add(&mut self, record: &ValueRecord) -> Result<()> {
        if let Some((last_key, _)) = &self.last {
            if record.key.as_str() <= last_key.as_str() {
                return Err(TierError::Storage(format!(
                    "SSTable keys out of order: {:?} after {:?}",
                    record.key, last_key
                )));
            }
        }

        if self.entry_count % self.index_interval as u64 == 0 {
            self.index.push((record.key.clone(), self.current_offset));
        }
        if self.min_key.is_none() {
            self.min_key = Some(record.key.clone());
        }
        self.last = Some((record.key.clone(), self.current_offset));

        let key = record.key.as_bytes();
        let key_len = u32::try_from(key.len())
            .map_err(|_| TierError::Storage(format!("key too large: {} bytes", key.len())))?;
        let val_len = if record.deleted {
            TOMBSTONE_MARKER
        } else {
            u32::try_from(record.value.len())
                .ok()
                .filter(|len| *len != TOMBSTONE_MARKER)
                .ok_or_else(|| {
                    TierError::Storage(format!("value too large: {} bytes", record.value.len()))
                })?
        };

        // Write and accumulate CRC
        let key_len_bytes = key_len.to_le_bytes();
        let val_len_bytes = val_len.to_le_bytes();

        self.writer.write_all(&key_len_bytes)?;
        self.writer.write_all(&val_len_bytes)?;
        self.writer.write_all(key)?;

        self.data_hasher.update(&key_len_bytes);
        self.data_hasher.update(&val_len_bytes);
        self.data_hasher.update(key);

        let mut entry_size: u64 = 8 + key.len() as u64;

        if !record.deleted {
            self.writer.write_all(&record.value)?;
            self.data_hasher.update(&record.value);
            entry_size += record.value.len() as u64;
        }

        self.current_offset += entry_size;
        self.entry_count += 1;

        Ok(())
    }

    /// Bytes written so far (header + data)
    pub fn bytes_written(&self) -> u64 {
        self.current_offset
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finish building: write index region, footer, and return a summary
    pub fn finish(mut self) -> Result<SSTableInfo> {
        let (max_key, last_offset) = match self.last.take() {
            Some(last) => last,
            None => return Err(TierError::Storage("Cannot finish empty SSTable".to_string())),
        };

        // The final record is always indexed so the last index key is the max key
        if self.index.last().map(|(_, offset)| *offset) != Some(last_offset) {
            self.index.push((max_key.clone(), last_offset));
        }

        let index_offset = self.current_offset;
        for (key, offset) in &self.index {
            let key_len = key.len() as u32;
            self.writer.write_all(&key_len.to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(key.as_bytes())?;
        }

        let data_crc = self.data_hasher.finalize();
        let index_entries = self.index.len() as u32;

        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&index_entries.to_le_bytes())?;

        self.writer.flush()?;

        // Seek back and update entry count in header
        let mut file = self.writer.into_inner().map_err(|e| {
            TierError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        file.seek(SeekFrom::Start(6))?; // After magic + version
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(SSTableInfo {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key,
            index_entries,
            file_size,
        })
    }

    /// Give up on this table and remove the partial file
    pub fn abandon(self) {
        let path = self.path.clone();
        drop(self.writer);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial SSTable");
        }
    }
}
