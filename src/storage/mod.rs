//! Storage Module
//!
//! Persistent storage layer: immutable SSTables organized into levels.
//!
//! ## Responsibilities
//! - Persist frozen memtables as level 0 SSTables
//! - Point lookups: level 0 newest first, then one table per deeper level
//! - Merge an oversized level into the next one (compaction)
//! - Publish every change as one atomic snapshot swap
//!
//! ## Layout
//! ```text
//! Level 0:  [L0_000007] [L0_000008] [L0_000009]     overlapping, newest wins
//! Level 1:  [a..f] [g..m] [n..z]                     disjoint, sorted by key
//! Level 2:  [a..c] [d..h] [i..p] [q..z]              disjoint, 10x budget
//! ```

mod sstable;
mod level;
mod compaction;
mod tree;

pub use sstable::{SSTable, SSTableBuilder, SSTableInfo, SSTableIterator, SSTableReader};
pub use level::{Level, LevelStats, Version};
pub use compaction::{pick_level, CompactionOutcome, MergeIterator};
pub use tree::TableTree;
