//! WAL Writer
//!
//! Handles appending entries to the WAL file.
//!
//! Each frame is serialized whole and written straight to the file, so no
//! bytes of a rejected append stay behind in process memory. A failed append
//! cuts the file back to the end of the last complete frame.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{Result, TierError};
use crate::record::ValueRecord;

use super::{WalEntry, WalReader};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    file: File,
    /// LSN handed to the next append
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Appends since the last fsync
    unsynced: usize,
    /// End of the last complete frame
    len: u64,
    /// Set when a failed append could not be cut off again
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Existing frames are scanned so that LSNs keep increasing. A torn or
    /// corrupt tail is cut off so new frames follow the last intact one.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let mut next_lsn = 1;
        let mut valid_len = None;
        if path.exists() {
            let mut reader = WalReader::open(path)?;
            loop {
                match reader.next_entry() {
                    Ok(Some(entry)) => next_lsn = entry.lsn + 1,
                    Ok(None) => break,
                    Err(TierError::WalCorruption(_)) => {
                        valid_len = Some(reader.position());
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let writer = Self::resume(path, sync_strategy, next_lsn)?;
        match valid_len {
            Some(len) if len < writer.len => writer.truncate_to(len),
            _ => Ok(writer),
        }
    }

    /// Open or create a WAL file, continuing from a known LSN
    pub fn resume(path: &Path, sync_strategy: WalSyncStrategy, next_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_lsn,
            sync_strategy,
            unsynced: 0,
            len,
            poisoned: false,
        })
    }

    fn truncate_to(mut self, len: u64) -> Result<Self> {
        tracing::warn!(
            path = %self.path.display(),
            from = self.len,
            to = len,
            "Cutting corrupt WAL tail before appending"
        );
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.len = len;
        Ok(self)
    }

    /// Append a record to the WAL, returning its LSN
    ///
    /// The frame is handed to the OS before returning; fsync follows the
    /// configured strategy. On error the frame is removed from the file and
    /// the LSN is not consumed, so nothing should be applied in memory.
    pub fn append(&mut self, record: &ValueRecord) -> Result<u64> {
        if self.poisoned {
            return Err(TierError::Storage(format!(
                "WAL {} holds a partial frame that could not be removed",
                self.path.display()
            )));
        }

        let lsn = self.next_lsn;
        let bytes = WalEntry::new(lsn, record.clone()).serialize()?;

        if let Err(e) = self.write_frame(&bytes) {
            self.roll_back();
            return Err(e);
        }

        self.len += bytes.len() as u64;
        self.next_lsn += 1;
        Ok(lsn)
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    /// Cut the file back to the end of the last complete frame
    fn roll_back(&mut self) {
        match self.file.set_len(self.len) {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                len = self.len,
                "Rolled back failed WAL append"
            ),
            Err(e) => {
                self.poisoned = true;
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not roll back failed WAL append, refusing further appends"
                );
            }
        }
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Drop every frame. LSNs keep counting from where they were.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the LSN the next append will use
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
