//! SSTable Reader
//!
//! Opens SSTable files and looks keys up through the sparse index.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{Result, TierError};
use crate::record::ValueRecord;

use super::{read_record, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader for SSTable files with an in-memory sparse index
///
/// The file handle sits behind a mutex so lookups only need `&self`.
pub struct SSTableReader {
    /// File handle for reading records
    file: Mutex<BufReader<File>>,
    /// Sparse index: key → file offset, sorted by key
    index: Vec<(String, u64)>,
    /// Metadata
    entry_count: u64,
    /// Index region starting offset (end of the data region)
    index_offset: u64,
    data_crc: u32,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Validates the header, locates the index via the footer, and loads the
    /// sparse index into memory.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(TierError::Storage(format!(
                "SSTable too small: {} bytes",
                file_size
            )));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(TierError::Storage(format!(
                "Invalid SSTable magic: expected TRKV, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(TierError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let mut count = [0u8; 8];
        count.copy_from_slice(&header[6..14]);
        let entry_count = u64::from_le_bytes(count);

        // Read footer to get index offset
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let mut offset_bytes = [0u8; 8];
        offset_bytes.copy_from_slice(&footer[0..8]);
        let index_offset = u64::from_le_bytes(offset_bytes);
        let data_crc = u32::from_le_bytes([footer[8], footer[9], footer[10], footer[11]]);
        let index_entries = u32::from_le_bytes([footer[12], footer[13], footer[14], footer[15]]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(TierError::Storage(format!(
                "SSTable index offset {} outside file of {} bytes",
                index_offset, file_size
            )));
        }

        // Load the sparse index region
        file.seek(SeekFrom::Start(index_offset))?;
        let index_block_size = file_size - FOOTER_SIZE - index_offset;
        let mut index_data = vec![0u8; index_block_size as usize];
        file.read_exact(&mut index_data)?;

        let index = Self::parse_index(&index_data, index_entries)?;

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            file: Mutex::new(BufReader::new(file)),
            index,
            entry_count,
            index_offset,
            data_crc,
        })
    }

    /// Parse `[key_len(4)][offset(8)][key]` entries
    fn parse_index(data: &[u8], expected: u32) -> Result<Vec<(String, u64)>> {
        let truncated = || TierError::Storage("SSTable index region truncated".to_string());

        let mut index = Vec::with_capacity(expected as usize);
        let mut pos = 0;
        for _ in 0..expected {
            let len_bytes = data.get(pos..pos + 4).ok_or_else(truncated)?;
            let key_len =
                u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
                    as usize;
            pos += 4;

            let mut offset = [0u8; 8];
            offset.copy_from_slice(data.get(pos..pos + 8).ok_or_else(truncated)?);
            pos += 8;

            let key = data.get(pos..pos + key_len).ok_or_else(truncated)?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| TierError::Storage(format!("SSTable index key is not UTF-8: {}", e)))?;
            pos += key_len;

            index.push((key, u64::from_le_bytes(offset)));
        }
        Ok(index)
    }

    /// Get a record by key
    ///
    /// Seeks to the largest indexed key not above `key`, then scans forward
    /// until the key is found, passed, or the next index point is reached.
    ///
    /// Returns:
    /// - `Ok(record)`: key found (the record may be a tombstone)
    /// - `Err(KeyNotFound)`: key not in this SSTable
    pub fn get(&self, key: &str) -> Result<ValueRecord> {
        let slot = self.index.partition_point(|(k, _)| k.as_str() <= key);
        if slot == 0 {
            return Err(TierError::KeyNotFound);
        }

        let mut offset = self.index[slot - 1].1;
        let end = self
            .index
            .get(slot)
            .map(|(_, next)| *next)
            .unwrap_or(self.index_offset);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        while offset < end {
            let (record, size) = read_record(&mut *file)?;
            if record.key == key {
                return Ok(record);
            }
            if record.key.as_str() > key {
                break;
            }
            offset += size;
        }

        Err(TierError::KeyNotFound)
    }

    /// Recompute the data region checksum and compare with the footer
    pub fn verify(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(HEADER_SIZE))?;

        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = self.index_offset - HEADER_SIZE;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let chunk = remaining.min(buf.len() as u64) as usize;
            file.read_exact(&mut buf[..chunk])?;
            hasher.update(&buf[..chunk]);
            remaining -= chunk as u64;
        }

        let crc = hasher.finalize();
        if crc != self.data_crc {
            return Err(TierError::Storage(format!(
                "SSTable data checksum mismatch: expected {:#010x}, got {:#010x}",
                self.data_crc, crc
            )));
        }
        Ok(())
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Number of sparse index entries
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// End of the data region
    pub fn index_offset(&self) -> u64 {
        self.index_offset
    }

    /// Get the minimum key in this SSTable (for range filtering)
    pub fn min_key(&self) -> Option<&str> {
        self.index.first().map(|(k, _)| k.as_str())
    }

    /// Get the maximum key in this SSTable (the final record is always indexed)
    pub fn max_key(&self) -> Option<&str> {
        self.index.last().map(|(k, _)| k.as_str())
    }

    /// Quick check if a key might be in this SSTable (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &str) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false, // Empty SSTable
        }
    }
}
