//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Result, TierError};

use super::entry::FrameHeader;
use super::{WalEntry, HEADER_SIZE};

/// Reads entries from the WAL file, front to back
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last frame returned
    position: u64,
    file_len: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            file_len,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file and
    /// `Err(WalCorruption)` when the remaining bytes do not form a valid
    /// frame. The reader does not advance past a bad frame.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let remaining = self.file_len - self.position;
        if remaining == 0 {
            return Ok(None);
        }

        if remaining < HEADER_SIZE as u64 {
            return Err(TierError::WalCorruption(format!(
                "partial header at offset {} ({} bytes)",
                self.position, remaining
            )));
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header_buf)?;
        let header = FrameHeader::decode(&header_buf);

        let frame_len = HEADER_SIZE as u64 + header.len as u64;
        if frame_len > remaining {
            return Err(TierError::WalCorruption(format!(
                "partial frame at offset {}: need {} bytes, have {}",
                self.position, frame_len, remaining
            )));
        }

        let mut payload = vec![0u8; header.len as usize];
        self.reader.read_exact(&mut payload)?;
        let entry = WalEntry::from_payload(header, &payload)?;

        self.position += frame_len;
        Ok(Some(entry))
    }

    /// Offset of the end of the valid prefix read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over entries until end of file or the first bad frame
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
///
/// Yields at most one error, then stops.
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
