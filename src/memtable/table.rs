//! MemTable implementation
//!
//! Skip-list-based memtable with RwLock for concurrency.

use parking_lot::RwLock;

use crate::config::Config;
use crate::record::ValueRecord;

use super::SkipList;

/// In-memory table for recent writes
pub struct MemTable {
    list: RwLock<SkipList>,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new(max_level: usize, probability: f64) -> Self {
        Self {
            list: RwLock::new(SkipList::new(max_level, probability)),
        }
    }

    /// Create a MemTable shaped by the skip list options in `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.skiplist_max_level, config.skiplist_probability)
    }

    /// Get a record by key (read lock). Tombstones are returned as-is.
    pub fn get(&self, key: &str) -> Option<ValueRecord> {
        self.list.read().search(key).cloned()
    }

    /// Insert or overwrite a record (write lock). Returns the new entry count.
    pub fn set(&self, record: ValueRecord) -> usize {
        let mut list = self.list.write();
        list.set(record);
        list.len()
    }

    /// Physically remove a key (write lock)
    ///
    /// This is not the durable delete path; that one stores a tombstone
    /// through [`MemTable::set`].
    pub fn remove(&self, key: &str) -> bool {
        self.list.write().delete(key)
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.list.read().size()
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.list.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.read().is_empty()
    }

    /// Check if either flush trigger has been exceeded
    pub fn should_flush(&self, record_limit: usize, size_limit: usize) -> bool {
        let list = self.list.read();
        list.len() > record_limit || list.size() > size_limit
    }

    /// Snapshot of all records in sorted key order
    pub fn values(&self) -> Vec<ValueRecord> {
        self.list.read().values()
    }

    /// Freeze the current contents
    ///
    /// Under the write lock, an empty list with the same level and
    /// probability settings takes over and the displaced list is handed back
    /// to the caller, which owns it from now on.
    pub fn swap(&self) -> SkipList {
        self.list.write().swap()
    }
}
