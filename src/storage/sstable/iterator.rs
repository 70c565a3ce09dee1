//! SSTable Iterator
//!
//! Sequential iteration over all records in an SSTable.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;
use crate::record::ValueRecord;

use super::{read_record, HEADER_SIZE};

/// Iterator over SSTable records in sorted key order
///
/// Owns its own file handle, so it never contends with point lookups.
pub struct SSTableIterator {
    file: BufReader<File>,
    /// Stop reading when we reach this offset (start of index region)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
}

impl SSTableIterator {
    /// Open `path` and position at the start of the data region
    pub fn open(path: &Path, end_offset: u64) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
        })
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<ValueRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop at index region
        if self.current_offset >= self.end_offset {
            return None;
        }

        match read_record(&mut self.file) {
            Ok((record, size)) => {
                self.current_offset += size;
                Some(Ok(record))
            }
            Err(e) => {
                // Nothing after a bad record can be trusted
                self.current_offset = self.end_offset;
                Some(Err(e))
            }
        }
    }
}
