//! Flush Checkpoint
//!
//! Records the highest LSN whose record already lives in an SSTable. Replay
//! skips every frame at or below it, so a WAL generation that outlives its
//! flush can never shadow newer data.
//!
//! ## File Format
//! ```text
//! [Magic "TKCP" (4)][FlushedLsn u64 (8)][CRC u32 (4)]
//! ```
//! The CRC covers magic and LSN. The file is replaced through
//! `checkpoint.tmp` and a rename.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, TierError};

const CHECKPOINT_MAGIC: &[u8; 4] = b"TKCP";
const CHECKPOINT_SIZE: usize = 16;
const CHECKPOINT_FILE: &str = "checkpoint";
const CHECKPOINT_STAGING: &str = "checkpoint.tmp";

/// Durable flushed-LSN watermark kept beside the WAL generations
#[derive(Debug, Clone)]
pub struct FlushCheckpoint {
    path: PathBuf,
    staging: PathBuf,
}

impl FlushCheckpoint {
    pub fn new(wal_dir: &Path) -> Self {
        Self {
            path: wal_dir.join(CHECKPOINT_FILE),
            staging: wal_dir.join(CHECKPOINT_STAGING),
        }
    }

    /// Highest flushed LSN, 0 when nothing was ever checkpointed
    pub fn load(&self) -> Result<u64> {
        let buf = match fs::read(&self.path) {
            Ok(buf) => buf,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        if buf.len() != CHECKPOINT_SIZE || &buf[0..4] != CHECKPOINT_MAGIC {
            return Err(TierError::WalCorruption(format!(
                "malformed checkpoint {} ({} bytes)",
                self.path.display(),
                buf.len()
            )));
        }

        let stored = u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let computed = crc32fast::hash(&buf[0..12]);
        if stored != computed {
            return Err(TierError::WalCorruption(format!(
                "checkpoint checksum mismatch: expected {:#010x}, got {:#010x}",
                stored, computed
            )));
        }

        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&buf[4..12]);
        Ok(u64::from_le_bytes(lsn))
    }

    /// Atomically replace the stored watermark
    pub fn store(&self, lsn: u64) -> Result<()> {
        let mut buf = Vec::with_capacity(CHECKPOINT_SIZE);
        buf.extend_from_slice(CHECKPOINT_MAGIC);
        buf.extend_from_slice(&lsn.to_le_bytes());
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        let mut file = File::create(&self.staging)?;
        file.write_all(&buf)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.staging, &self.path)?;
        tracing::debug!(lsn, "Stored flush checkpoint");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
