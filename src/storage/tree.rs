//! Table Tree
//!
//! Owns every SSTable, grouped into levels, and drives flush-in and
//! compaction.
//!
//! ## Concurrency:
//! - `version`: one `Arc<Version>` behind an RwLock. Writers build a new
//!   snapshot and replace the pointer; readers clone it and search it unlocked.
//! - `next_table_id`: Atomic counter (lock-free)
//! - `compaction_lock`: at most one compaction at a time
//!
//! ## Staging
//! Every table is written as `*.sst.tmp` and renamed only once complete.
//! Nothing enters a snapshot before that rename.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{Result, TierError};
use crate::record::ValueRecord;

use super::compaction::{self, CompactionOutcome, CompactionPlan};
use super::{Level, LevelStats, SSTable, SSTableBuilder, Version};

const TABLE_EXTENSION: &str = "sst";
const STAGING_EXTENSION: &str = "tmp";

/// The leveled collection of SSTables
pub struct TableTree {
    /// Directory where SSTables are stored
    dir: PathBuf,
    config: Config,
    /// Current snapshot of all levels
    version: RwLock<Arc<Version>>,
    /// Next ID for creating new SSTables (atomic, lock-free)
    next_table_id: AtomicU64,
    compaction_lock: Mutex<()>,
}

impl TableTree {
    /// Open or create the tree in `dir`
    ///
    /// On startup:
    /// 1. Remove staging files left by an interrupted flush or compaction
    /// 2. Discover existing SSTables by file name (level + id)
    /// 3. Drop deeper-level tables made redundant by a newer overlapping one
    pub fn open(dir: &Path, config: Config) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut found: Vec<(usize, u64, PathBuf)> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            if path.extension().and_then(|e| e.to_str()) == Some(STAGING_EXTENSION) {
                tracing::warn!(path = %path.display(), "Removing stale staging file");
                fs::remove_file(&path)?;
                continue;
            }

            if let Some((level, id)) = Self::parse_table_name(&path) {
                found.push((level, id, path));
            }
        }

        let mut levels: Vec<Vec<Arc<SSTable>>> = vec![Vec::new(); config.max_levels];
        let mut max_id = 0;
        for (level, id, path) in found {
            if level >= config.max_levels {
                return Err(TierError::Storage(format!(
                    "SSTable {} belongs to level {} but only {} levels are configured",
                    path.display(),
                    level,
                    config.max_levels
                )));
            }
            max_id = max_id.max(id);
            levels[level].push(Arc::new(SSTable::open(&path, id, level)?));
        }

        let levels = levels
            .into_iter()
            .enumerate()
            .map(|(number, tables)| {
                let tables = if number == 0 {
                    tables
                } else {
                    Self::drop_superseded(tables)
                };
                Level::with_tables(number, tables)
            })
            .collect();
        let version = Version::from_levels(levels);

        tracing::info!(
            dir = %dir.display(),
            tables = version.table_count(),
            next_id = max_id + 1,
            "Opened table tree"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            version: RwLock::new(Arc::new(version)),
            next_table_id: AtomicU64::new(max_id + 1),
            compaction_lock: Mutex::new(()),
        })
    }

    /// Keep the newest table of any overlapping group in a deeper level
    ///
    /// Overlap there only happens when a crash hit after compaction outputs
    /// were renamed but before the consumed tables were removed; the outputs
    /// carry higher ids and hold every key of what they replaced.
    fn drop_superseded(mut tables: Vec<Arc<SSTable>>) -> Vec<Arc<SSTable>> {
        tables.sort_by(|a, b| b.id().cmp(&a.id()));

        let mut kept: Vec<Arc<SSTable>> = Vec::with_capacity(tables.len());
        for table in tables {
            if kept.iter().any(|k| k.overlaps(table.min_key(), table.max_key())) {
                tracing::warn!(
                    id = table.id(),
                    level = table.level(),
                    "Dropping SSTable superseded by an unfinished compaction"
                );
                table.mark_obsolete();
            } else {
                kept.push(table);
            }
        }
        kept
    }

    /// Current snapshot of all levels
    pub fn snapshot(&self) -> Arc<Version> {
        Arc::clone(&self.version.read())
    }

    /// Find the newest record for `key`
    ///
    /// Returns:
    /// - `Ok(Some(record))`: found, the record may be a tombstone
    /// - `Ok(None)`: no table holds the key
    pub fn get(&self, key: &str) -> Result<Option<ValueRecord>> {
        self.snapshot().get(key)
    }

    /// Write sorted records as a new level 0 table and publish it
    ///
    /// Returns `None` when there was nothing to write.
    pub fn flush<'a, I>(&self, records: I) -> Result<Option<Arc<SSTable>>>
    where
        I: IntoIterator<Item = &'a ValueRecord>,
    {
        let mut records = records.into_iter().peekable();
        if records.peek().is_none() {
            return Ok(None);
        }

        let id = self.allocate_id();
        let mut builder = SSTableBuilder::new(&self.staging_path(0, id), self.config.index_interval)?;

        if let Err(e) = records.try_for_each(|record| builder.add(record)) {
            builder.abandon();
            return Err(e);
        }
        if let Err(e) = finish_staged(builder) {
            self.discard_staged(0, &[id]);
            return Err(e);
        }
        let table = match self.publish_staged(0, id) {
            Ok(table) => table,
            Err(e) => {
                self.discard_staged(0, &[id]);
                return Err(e);
            }
        };

        let table = Arc::new(table);
        {
            let mut version = self.version.write();
            *version = Arc::new(version.with_flushed(Arc::clone(&table)));
        }

        tracing::info!(
            id,
            entries = table.entry_count(),
            bytes = table.file_size(),
            "Flushed memtable to level 0"
        );
        Ok(Some(table))
    }

    /// The first level over budget, if any
    pub fn needs_compaction(&self) -> Option<usize> {
        compaction::pick_level(&self.snapshot(), &self.config)
    }

    /// Run compactions until every level is within budget
    pub fn compact(&self) -> Result<Vec<CompactionOutcome>> {
        let mut outcomes = Vec::new();
        // Each pass empties its source level
        for _ in 0..self.config.max_levels * 4 {
            let level = match self.needs_compaction() {
                Some(level) => level,
                None => break,
            };
            outcomes.push(self.compact_level(level)?);
        }
        Ok(outcomes)
    }

    /// Merge every table of `level` into `level + 1`
    ///
    /// Outputs are staged, renamed, and published in a single snapshot swap.
    /// On any failure the tree is left untouched and staged files removed.
    pub fn compact_level(&self, level: usize) -> Result<CompactionOutcome> {
        let _guard = self.compaction_lock.lock();

        if level + 1 >= self.config.max_levels {
            return Err(TierError::Compaction(format!(
                "level {} is the deepest level",
                level
            )));
        }

        let version = self.snapshot();
        let plan = match CompactionPlan::new(&version, level) {
            Some(plan) => plan,
            None => {
                return Ok(CompactionOutcome {
                    source_level: level,
                    target_level: level + 1,
                    inputs: 0,
                    consumed: 0,
                    outputs: 0,
                    records_written: 0,
                    tombstones_dropped: 0,
                    bytes_written: 0,
                })
            }
        };

        tracing::info!(
            source_level = level,
            target_level = plan.target(),
            inputs = plan.inputs.len(),
            consumed = plan.consumed.len(),
            "Starting compaction"
        );

        let mut staged: Vec<u64> = Vec::new();
        let written = self.write_outputs(&version, &plan, &mut staged);
        let (records_written, tombstones_dropped) = match written {
            Ok(counts) => counts,
            Err(e) => {
                self.discard_staged(plan.target(), &staged);
                return Err(e);
            }
        };

        let mut outputs = Vec::with_capacity(staged.len());
        for id in &staged {
            match self.publish_staged(plan.target(), *id) {
                Ok(table) => outputs.push(Arc::new(table)),
                Err(e) => {
                    for table in &outputs {
                        table.mark_obsolete();
                    }
                    self.discard_staged(plan.target(), &staged);
                    return Err(e);
                }
            }
        }
        let bytes_written = outputs.iter().map(|t| t.file_size()).sum();
        let output_count = outputs.len();

        let input_ids = plan.input_ids();
        let consumed_ids = plan.consumed_ids();
        {
            let mut current = self.version.write();
            *current = Arc::new(current.with_compaction(
                level,
                &input_ids,
                &consumed_ids,
                outputs,
            ));
        }

        for table in plan.inputs.iter().chain(plan.consumed.iter()) {
            table.mark_obsolete();
        }

        let outcome = CompactionOutcome {
            source_level: level,
            target_level: plan.target(),
            inputs: plan.inputs.len(),
            consumed: plan.consumed.len(),
            outputs: output_count,
            records_written,
            tombstones_dropped,
            bytes_written,
        };
        tracing::info!(?outcome, "Compaction finished");
        Ok(outcome)
    }

    /// Merge the plan's inputs into staged tables of at most `part_size` bytes
    fn write_outputs(
        &self,
        version: &Version,
        plan: &CompactionPlan,
        staged: &mut Vec<u64>,
    ) -> Result<(u64, u64)> {
        let target = plan.target();
        let mut records_written = 0;
        let mut tombstones_dropped = 0;
        let mut current: Option<(SSTableBuilder, u64)> = None;

        for record in plan.merge()? {
            let record = record?;
            if record.deleted && compaction::tombstone_droppable(version, target, &record.key) {
                tombstones_dropped += 1;
                continue;
            }

            if current.is_none() {
                let id = self.allocate_id();
                staged.push(id);
                let builder = SSTableBuilder::new(&self.staging_path(target, id), self.config.index_interval)?;
                current = Some((builder, id));
            }

            if let Some((builder, id)) = current.as_mut() {
                builder.add(&record)?;
                records_written += 1;

                if builder.bytes_written() >= self.config.part_size {
                    tracing::debug!(id = *id, "Compaction output reached part size");
                    if let Some((full, _)) = current.take() {
                        finish_staged(full)?;
                    }
                }
            }
        }

        if let Some((builder, _)) = current.take() {
            finish_staged(builder)?;
        }

        Ok((records_written, tombstones_dropped))
    }

    /// Rename a finished staging file into place and open it
    fn publish_staged(&self, level: usize, id: u64) -> Result<SSTable> {
        let staging = self.staging_path(level, id);
        let path = self.table_path(level, id);
        fs::rename(&staging, &path)?;
        SSTable::open(&path, id, level)
    }

    /// Remove every staged or already-renamed output of a failed flush or compaction
    fn discard_staged(&self, level: usize, ids: &[u64]) {
        for id in ids {
            for path in [self.staging_path(level, *id), self.table_path(level, *id)] {
                if path.exists() {
                    if let Err(e) = fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to remove unpublished SSTable");
                    }
                }
            }
        }
    }

    /// Per-level table counts and sizes
    pub fn level_stats(&self) -> Vec<LevelStats> {
        self.snapshot().stats()
    }

    /// Get the number of SSTables across all levels
    pub fn table_count(&self) -> usize {
        self.snapshot().table_count()
    }

    /// Get the data directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the next SSTable ID (for testing/debugging)
    pub fn next_table_id(&self) -> u64 {
        self.next_table_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn allocate_id(&self) -> u64 {
        self.next_table_id.fetch_add(1, Ordering::SeqCst)
    }

    /// "L1_000042.sst"
    fn table_path(&self, level: usize, id: u64) -> PathBuf {
        self.dir.join(format!("L{}_{:06}.{}", level, id, TABLE_EXTENSION))
    }

    /// "L1_000042.sst.tmp"
    fn staging_path(&self, level: usize, id: u64) -> PathBuf {
        self.dir
            .join(format!("L{}_{:06}.{}.{}", level, id, TABLE_EXTENSION, STAGING_EXTENSION))
    }

    /// "L1_000042.sst" → Some((1, 42))
    fn parse_table_name(path: &Path) -> Option<(usize, u64)> {
        if path.extension()?.to_str()? != TABLE_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let (level, id) = stem.strip_prefix('L')?.split_once('_')?;
        Some((level.parse().ok()?, id.parse().ok()?))
    }
}

/// Finish a builder writing to a staging path
fn finish_staged(builder: SSTableBuilder) -> Result<()> {
    let info = builder.finish()?;
    tracing::debug!(
        path = %info.path.display(),
        entries = info.entry_count,
        bytes = info.file_size,
        "Staged SSTable"
    );
    Ok(())
}
