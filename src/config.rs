//! Configuration for TierKV
//!
//! Centralized configuration with sensible defaults. Every option is named
//! and checked by [`ConfigBuilder::build`].

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TierError};

/// Main configuration for a TierKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal/             (one write-ahead log per memtable generation)
    ///     └── sstables/        (SSTable files, named by level and id)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Freeze the memtable once it holds more than this many records
    pub memtable_threshold: usize,

    /// Freeze the memtable once its approximate size exceeds this many bytes
    pub memtable_size_limit: usize,

    /// Maximum number of index levels in the skip list
    pub skiplist_max_level: usize,

    /// Probability of promoting a skip list node one more level
    pub skiplist_probability: f64,

    // -------------------------------------------------------------------------
    // Table Tree Configuration
    // -------------------------------------------------------------------------
    /// Level 0 is compacted once it holds more tables than this
    pub level0_max_tables: usize,

    /// Byte budget of level 0; level N gets `level0_size * multiplier^N`
    pub level0_size: u64,

    /// Growth factor between consecutive level budgets
    pub level_size_multiplier: u64,

    /// Number of levels in the tree (the deepest one is never compacted)
    pub max_levels: usize,

    /// Target byte size of each table written by compaction
    pub part_size: u64,

    /// One sparse index entry is written every `index_interval` records
    pub index_interval: usize,

    // -------------------------------------------------------------------------
    // Background Configuration
    // -------------------------------------------------------------------------
    /// How often the background worker checks level budgets
    pub check_interval: Duration,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tierkv_data"),
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            memtable_threshold: 3000,
            memtable_size_limit: 64 * 1024 * 1024, // 64 MB
            skiplist_max_level: 18,
            skiplist_probability: 1.0 / std::f64::consts::E,
            level0_max_tables: 4,
            level0_size: 16 * 1024 * 1024, // 16 MB
            level_size_multiplier: 10,
            max_levels: 7,
            part_size: 4 * 1024 * 1024, // 4 MB
            index_interval: 16,
            check_interval: Duration::from_secs(3),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Byte budget for `level`
    pub fn level_budget(&self, level: usize) -> u64 {
        let mut budget = self.level0_size;
        for _ in 0..level {
            budget = budget.saturating_mul(self.level_size_multiplier);
        }
        budget
    }

    /// Check every option, returning the first violation found
    pub fn validate(&self) -> Result<()> {
        fn invalid(msg: &str) -> Result<()> {
            Err(TierError::Config(msg.to_string()))
        }

        if self.data_dir.as_os_str().is_empty() {
            return invalid("data_dir must not be empty");
        }
        if let WalSyncStrategy::EveryNEntries { count: 0 } = self.wal_sync_strategy {
            return invalid("wal_sync_strategy count must be greater than 0");
        }
        if self.memtable_threshold == 0 {
            return invalid("memtable_threshold must be greater than 0");
        }
        if self.memtable_size_limit == 0 {
            return invalid("memtable_size_limit must be greater than 0");
        }
        if !(1..=64).contains(&self.skiplist_max_level) {
            return invalid("skiplist_max_level must be between 1 and 64");
        }
        if !(self.skiplist_probability > 0.0 && self.skiplist_probability < 1.0) {
            return invalid("skiplist_probability must be in (0, 1)");
        }
        if self.level0_max_tables == 0 {
            return invalid("level0_max_tables must be greater than 0");
        }
        if self.level0_size == 0 {
            return invalid("level0_size must be greater than 0");
        }
        if self.level_size_multiplier < 2 {
            return invalid("level_size_multiplier must be at least 2");
        }
        if !(2..=16).contains(&self.max_levels) {
            return invalid("max_levels must be between 2 and 16");
        }
        if self.part_size == 0 {
            return invalid("part_size must be greater than 0");
        }
        if self.index_interval == 0 {
            return invalid("index_interval must be greater than 0");
        }
        if self.check_interval.is_zero() {
            return invalid("check_interval must be non-zero");
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the memtable record threshold
    pub fn memtable_threshold(mut self, records: usize) -> Self {
        self.config.memtable_threshold = records;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn memtable_size_limit(mut self, size: usize) -> Self {
        self.config.memtable_size_limit = size;
        self
    }

    /// Set the skip list maximum level
    pub fn skiplist_max_level(mut self, level: usize) -> Self {
        self.config.skiplist_max_level = level;
        self
    }

    /// Set the skip list promotion probability
    pub fn skiplist_probability(mut self, probability: f64) -> Self {
        self.config.skiplist_probability = probability;
        self
    }

    /// Set the level 0 table count threshold
    pub fn level0_max_tables(mut self, count: usize) -> Self {
        self.config.level0_max_tables = count;
        self
    }

    /// Set the level 0 byte budget
    pub fn level0_size(mut self, bytes: u64) -> Self {
        self.config.level0_size = bytes;
        self
    }

    /// Set the growth factor between level budgets
    pub fn level_size_multiplier(mut self, factor: u64) -> Self {
        self.config.level_size_multiplier = factor;
        self
    }

    /// Set the number of levels
    pub fn max_levels(mut self, levels: usize) -> Self {
        self.config.max_levels = levels;
        self
    }

    /// Set the target size of compaction output tables (in bytes)
    pub fn part_size(mut self, bytes: u64) -> Self {
        self.config.part_size = bytes;
        self
    }

    /// Set the sparse index interval (in records)
    pub fn index_interval(mut self, records: usize) -> Self {
        self.config.index_interval = records;
        self
    }

    /// Set the background check interval
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.config.check_interval = interval;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
