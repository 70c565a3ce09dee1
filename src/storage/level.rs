//! Levels and snapshots
//!
//! A [`Version`] is an immutable view of every level. The tree replaces the
//! whole `Arc<Version>` on each change, so a reader holding one never sees a
//! half-applied flush or compaction.

use std::sync::Arc;

use crate::error::Result;
use crate::record::ValueRecord;

use super::SSTable;

/// Per-level accounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelStats {
    pub level: usize,
    pub tables: usize,
    pub bytes: u64,
}

/// The tables of one level
///
/// Level 0 keeps tables in flush order (oldest first) and may overlap.
/// Deeper levels keep disjoint tables sorted by key range.
#[derive(Debug, Clone)]
pub struct Level {
    number: usize,
    tables: Vec<Arc<SSTable>>,
}

impl Level {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            tables: Vec::new(),
        }
    }

    /// Build a level, ordering `tables` the way the level number requires
    pub fn with_tables(number: usize, mut tables: Vec<Arc<SSTable>>) -> Self {
        if number == 0 {
            tables.sort_by_key(|t| t.id());
        } else {
            tables.sort_by(|a, b| a.min_key().cmp(b.min_key()));
        }
        Self { number, tables }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn tables(&self) -> &[Arc<SSTable>] {
        &self.tables
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total file bytes in this level
    pub fn size(&self) -> u64 {
        self.tables.iter().map(|t| t.file_size()).sum()
    }

    /// Smallest and largest key across the level
    pub fn key_range(&self) -> Option<(String, String)> {
        let min = self.tables.iter().map(|t| t.min_key()).min()?;
        let max = self.tables.iter().map(|t| t.max_key()).max()?;
        Some((min.to_string(), max.to_string()))
    }

    /// Tables whose key range intersects `[min, max]`
    pub fn overlapping(&self, min: &str, max: &str) -> Vec<Arc<SSTable>> {
        self.tables
            .iter()
            .filter(|t| t.overlaps(min, max))
            .cloned()
            .collect()
    }

    /// Whether any table's range covers `key`
    pub fn may_hold(&self, key: &str) -> bool {
        self.tables.iter().any(|t| t.might_contain(key))
    }

    /// Find the newest record for `key` in this level
    pub fn get(&self, key: &str) -> Result<Option<ValueRecord>> {
        if self.number == 0 {
            for table in self.tables.iter().rev() {
                if let Some(record) = table.get(key)? {
                    return Ok(Some(record));
                }
            }
            return Ok(None);
        }

        // Disjoint ranges: the only candidate is the first table ending at or after key
        let slot = self.tables.partition_point(|t| t.max_key() < key);
        match self.tables.get(slot) {
            Some(table) => table.get(key),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> LevelStats {
        LevelStats {
            level: self.number,
            tables: self.tables.len(),
            bytes: self.size(),
        }
    }

    pub(crate) fn push(&mut self, table: Arc<SSTable>) {
        self.tables.push(table);
    }

    /// Drop every table whose id is in `ids`
    pub(crate) fn remove_ids(&mut self, ids: &[u64]) {
        self.tables.retain(|t| !ids.contains(&t.id()));
    }
}

/// Immutable snapshot of the whole table tree
#[derive(Debug, Clone)]
pub struct Version {
    levels: Vec<Level>,
}

impl Version {
    /// An empty tree with `max_levels` levels
    pub fn new(max_levels: usize) -> Self {
        Self {
            levels: (0..max_levels).map(Level::new).collect(),
        }
    }

    pub fn from_levels(levels: Vec<Level>) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, number: usize) -> Option<&Level> {
        self.levels.get(number)
    }

    /// Probe levels top-down; the first record found wins, tombstones included
    pub fn get(&self, key: &str) -> Result<Option<ValueRecord>> {
        for level in &self.levels {
            if let Some(record) = level.get(key)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn table_count(&self) -> usize {
        self.levels.iter().map(Level::table_count).sum()
    }

    pub fn stats(&self) -> Vec<LevelStats> {
        self.levels.iter().map(Level::stats).collect()
    }

    /// A copy with `table` appended to level 0
    pub(crate) fn with_flushed(&self, table: Arc<SSTable>) -> Self {
        let mut next = self.clone();
        next.levels[0].push(table);
        next
    }

    /// A copy where `source` loses `inputs`, `source + 1` loses `consumed`,
    /// and `outputs` join `source + 1`
    pub(crate) fn with_compaction(
        &self,
        source: usize,
        inputs: &[u64],
        consumed: &[u64],
        outputs: Vec<Arc<SSTable>>,
    ) -> Self {
        let mut next = self.clone();
        next.levels[source].remove_ids(inputs);

        let target = &mut next.levels[source + 1];
        target.remove_ids(consumed);
        let mut tables = target.tables.clone();
        tables.extend(outputs);
        *target = Level::with_tables(source + 1, tables);
        next
    }
}
