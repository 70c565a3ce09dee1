//! Compaction
//!
//! Picks the level that has outgrown its budget and merges it into the next
//! one.
//!
//! # Level selection
//!
//! 1. Level 0 is compacted when it holds more than `level0_max_tables`
//!    tables or more than `level0_size` bytes.
//! 2. Level N (N >= 1) is compacted when it holds more than
//!    `level0_size * level_size_multiplier^N` bytes.
//! 3. The deepest level is never a source.
//!
//! # Merge
//!
//! All tables of the source level plus the overlapping tables of the target
//! level are read through a k-way merge. Sources are ranked by recency, so on
//! a duplicate key the newest record wins and the rest are skipped.
//!
//! # Tombstones
//!
//! A tombstone is dropped only when no level below the target has a table
//! whose key range covers it. Otherwise it is carried into the target.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::record::ValueRecord;

use super::{SSTable, SSTableIterator, Version};

/// What one compaction did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionOutcome {
    pub source_level: usize,
    pub target_level: usize,
    /// Tables read from the source level
    pub inputs: usize,
    /// Tables read from the target level
    pub consumed: usize,
    /// Tables written to the target level
    pub outputs: usize,
    pub records_written: u64,
    pub tombstones_dropped: u64,
    pub bytes_written: u64,
}

/// Find the first level over its budget, if any
pub fn pick_level(version: &Version, config: &Config) -> Option<usize> {
    let levels = version.levels();

    if let Some(level0) = levels.first() {
        if level0.table_count() > config.level0_max_tables || level0.size() > config.level0_size {
            return Some(0);
        }
    }

    levels
        .iter()
        .take(levels.len().saturating_sub(1))
        .skip(1)
        .find(|level| level.size() > config.level_budget(level.number()))
        .map(|level| level.number())
}

/// Tables taking part in one compaction
pub(crate) struct CompactionPlan {
    pub source: usize,
    /// Source level tables, newest first
    pub inputs: Vec<Arc<SSTable>>,
    /// Target level tables overlapping the inputs
    pub consumed: Vec<Arc<SSTable>>,
}

impl CompactionPlan {
    pub(crate) fn new(version: &Version, source: usize) -> Option<Self> {
        let level = version.level(source)?;
        let target = version.level(source + 1)?;
        let (min, max) = level.key_range()?;

        let mut inputs = level.tables().to_vec();
        inputs.sort_by(|a, b| b.id().cmp(&a.id()));

        Some(Self {
            source,
            inputs,
            consumed: target.overlapping(&min, &max),
        })
    }

    pub(crate) fn target(&self) -> usize {
        self.source + 1
    }

    pub(crate) fn input_ids(&self) -> Vec<u64> {
        self.inputs.iter().map(|t| t.id()).collect()
    }

    pub(crate) fn consumed_ids(&self) -> Vec<u64> {
        self.consumed.iter().map(|t| t.id()).collect()
    }

    /// Merge over every participating table, newest source first
    pub(crate) fn merge(&self) -> Result<MergeIterator> {
        let mut sources = Vec::with_capacity(self.inputs.len() + self.consumed.len());
        for table in self.inputs.iter().chain(self.consumed.iter()) {
            sources.push(table.iter()?);
        }
        MergeIterator::new(sources)
    }
}

/// Whether a tombstone for `key` can be discarded when writing into `target`
pub(crate) fn tombstone_droppable(version: &Version, target: usize, key: &str) -> bool {
    !version
        .levels()
        .iter()
        .skip(target + 1)
        .any(|level| level.may_hold(key))
}

// =============================================================================
// K-way Merge
// =============================================================================

struct HeapItem {
    record: ValueRecord,
    /// Lower rank = newer source
    rank: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    // Reversed so the max-heap pops the smallest key, newest rank first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .record
            .key
            .cmp(&self.record.key)
            .then_with(|| other.rank.cmp(&self.rank))
    }
}

/// Merges sorted sources into one sorted stream with unique keys
///
/// Sources are given newest first; for a key present in several sources
/// only the record from the newest one is yielded.
pub struct MergeIterator {
    sources: Vec<SSTableIterator>,
    heap: BinaryHeap<HeapItem>,
}

impl MergeIterator {
    pub fn new(sources: Vec<SSTableIterator>) -> Result<Self> {
        let mut merge = Self {
            sources,
            heap: BinaryHeap::new(),
        };
        for rank in 0..merge.sources.len() {
            merge.refill(rank)?;
        }
        Ok(merge)
    }

    fn refill(&mut self, rank: usize) -> Result<()> {
        if let Some(next) = self.sources[rank].next() {
            self.heap.push(HeapItem {
                record: next?,
                rank,
            });
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<ValueRecord>> {
        let winner = match self.heap.pop() {
            Some(item) => item,
            None => return Ok(None),
        };
        self.refill(winner.rank)?;

        while let Some(top) = self.heap.peek() {
            if top.record.key != winner.record.key {
                break;
            }
            if let Some(shadowed) = self.heap.pop() {
                self.refill(shadowed.rank)?;
            }
        }

        Ok(Some(winner.record))
    }
}

impl Iterator for MergeIterator {
    type Item = Result<ValueRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}
