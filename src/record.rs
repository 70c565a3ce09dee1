//! Value records
//!
//! The single unit of data that flows through the memtable, the WAL and
//! every SSTable.

use serde::{Deserialize, Serialize};

/// One key with its payload, or a tombstone for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub key: String,
    pub value: Vec<u8>,
    /// Logical deletion marker. Shadows older records for the same key.
    pub deleted: bool,
}

impl ValueRecord {
    /// A live value
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            deleted: false,
        }
    }

    /// A tombstone
    pub fn tombstone(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            deleted: true,
        }
    }

    /// Approximate in-memory footprint, used for the memtable byte limit
    pub fn approximate_size(&self) -> usize {
        self.key.len() + self.value.len() + 1
    }
}
