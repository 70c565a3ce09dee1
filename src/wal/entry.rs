//! WAL Entry definitions
//!
//! Defines the structure and framing of individual WAL log entries.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, TierError};
use crate::record::ValueRecord;

/// Frame header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The record being made durable
    pub record: ValueRecord,
}

/// Decoded frame header
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub lsn: u64,
    pub crc: u32,
    pub len: u32,
}

impl FrameHeader {
    pub(crate) fn decode(mut buf: &[u8]) -> Self {
        Self {
            lsn: buf.get_u64_le(),
            crc: buf.get_u32_le(),
            len: buf.get_u32_le(),
        }
    }
}

impl WalEntry {
    pub fn new(lsn: u64, record: ValueRecord) -> Self {
        Self { lsn, record }
    }

    /// Encode as a complete frame (header + data)
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&self.record)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            TierError::Serialization(format!("WAL record too large: {} bytes", payload.len()))
        })?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u64_le(self.lsn);
        buf.put_u32_le(Self::compute_crc(self.lsn, &payload));
        buf.put_u32_le(len);
        buf.put_slice(&payload);
        Ok(buf.to_vec())
    }

    /// Decode one frame from the front of `bytes`
    ///
    /// Returns the entry and the number of bytes consumed.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(TierError::WalCorruption(format!(
                "incomplete header: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let header = FrameHeader::decode(&bytes[..HEADER_SIZE]);
        let end = HEADER_SIZE + header.len as usize;
        if bytes.len() < end {
            return Err(TierError::WalCorruption(format!(
                "incomplete data: {} of {} bytes",
                bytes.len() - HEADER_SIZE,
                header.len
            )));
        }

        let entry = Self::from_payload(header, &bytes[HEADER_SIZE..end])?;
        Ok((entry, end))
    }

    /// Checksum over LSN and payload
    pub fn compute_crc(lsn: u64, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(payload);
        hasher.finalize()
    }

    pub(crate) fn from_payload(header: FrameHeader, payload: &[u8]) -> Result<Self> {
        let crc = Self::compute_crc(header.lsn, payload);
        if crc != header.crc {
            return Err(TierError::WalCorruption(format!(
                "checksum mismatch at lsn {}: expected {:#010x}, got {:#010x}",
                header.lsn, header.crc, crc
            )));
        }

        let record: ValueRecord = bincode::deserialize(payload)
            .map_err(|e| TierError::WalCorruption(format!("undecodable record: {}", e)))?;

        Ok(Self {
            lsn: header.lsn,
            record,
        })
    }
}
