//! Engine Module
//!
//! The database coordinator that ties memtable, WAL, and table tree together.
//!
//! ## Responsibilities
//! - Coordinate WAL, MemTable, and TableTree
//! - Handle concurrent read/write access
//! - Freeze the memtable under size pressure and hand it to flush
//! - Manage crash recovery on startup

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::background::{BackgroundWorker, CompactionStatus};
use crate::codec::{BincodeCodec, Collection, ValueCodec};
use crate::config::Config;
use crate::error::{Result, TierError};
use crate::memtable::{MemTable, SkipList};
use crate::record::ValueRecord;
use crate::storage::{CompactionOutcome, LevelStats, TableTree};
use crate::wal::{FlushCheckpoint, WalRecovery, WalWriter};

/// A memtable that no longer accepts writes, waiting to become an SSTable
pub(crate) struct FrozenMemTable {
    list: SkipList,
    /// WAL generation holding exactly this memtable's records
    wal_path: PathBuf,
    /// LSN of the last record in that generation
    last_lsn: u64,
}

/// The WAL currently receiving appends
struct ActiveWal {
    writer: WalWriter,
    generation: u64,
}

/// Point-in-time counters for tests and tooling
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub memtable_entries: usize,
    pub memtable_bytes: usize,
    /// Records in the memtable still being flushed, if any
    pub frozen_entries: Option<usize>,
    pub wal_generation: u64,
    pub levels: Vec<LevelStats>,
    pub compaction: CompactionStatus,
}

/// State shared between request threads and the background worker
pub(crate) struct EngineCore {
    config: Config,
    wal_dir: PathBuf,
    checkpoint: FlushCheckpoint,

    /// Serializes write operations (WAL append, memtable insert, freeze)
    wal: Mutex<ActiveWal>,

    /// In-memory table for recent writes (internal RwLock)
    memtable: MemTable,

    /// At most one frozen memtable. Its write lock also covers the swap of
    /// the active memtable so readers never fall between the two.
    frozen: RwLock<Option<Arc<FrozenMemTable>>>,

    /// Serializes flushes of the frozen memtable
    flush_lock: Mutex<()>,

    /// Persistent leveled storage (atomic snapshot swap)
    tree: TableTree,

    status: Mutex<CompactionStatus>,
    closed: AtomicBool,
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (set/delete/freeze): Serialized by the WAL mutex
///   - Only ONE write operation at a time
///   - Order: WAL append → memtable insert → maybe freeze
///
/// - **Reads** (get): Concurrent
///   - Memtable and frozen memtable under shared locks
///   - Table tree through an immutable snapshot
///
/// - **Background**: one worker thread flushes frozen memtables and runs
///   compaction on a fixed interval
pub struct Database {
    core: Arc<EngineCore>,
    worker: Mutex<Option<BackgroundWorker>>,
}

impl Database {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_DIR: &'static str = "wal";
    const SSTABLE_DIR: &'static str = "sstables";

    /// Open or create a database with the given config
    ///
    /// On startup:
    /// 1. Open/create data directories
    /// 2. Load existing SSTables into the table tree
    /// 3. Replay every WAL generation into a fresh memtable
    /// 4. Start the background worker
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let wal_dir = config.data_dir.join(Self::WAL_DIR);
        let storage_dir = config.data_dir.join(Self::SSTABLE_DIR);
        fs::create_dir_all(&wal_dir)?;
        fs::create_dir_all(&storage_dir)?;

        let tree = TableTree::open(&storage_dir, config.clone())?;
        let memtable = MemTable::from_config(&config);
        let checkpoint = FlushCheckpoint::new(&wal_dir);
        let wal = Self::recover(&config, &wal_dir, &checkpoint, &memtable, &tree)?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            memtable_entries = memtable.entry_count(),
            tables = tree.table_count(),
            wal_generation = wal.generation,
            "Database opened"
        );

        let core = Arc::new(EngineCore {
            config,
            wal_dir,
            checkpoint,
            wal: Mutex::new(wal),
            memtable,
            frozen: RwLock::new(None),
            flush_lock: Mutex::new(()),
            tree,
            status: Mutex::new(CompactionStatus::default()),
            closed: AtomicBool::new(false),
        });

        let worker = BackgroundWorker::spawn(Arc::clone(&core))?;

        Ok(Self {
            core,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config {
            data_dir: path.to_path_buf(),
            ..Config::default()
        };
        Self::open(config)
    }

    /// Rebuild the memtable from WAL generations, oldest first
    ///
    /// Entries at or below the flush checkpoint are already in SSTables and
    /// are skipped. With a single generation the log is reopened for
    /// appends. With more than one, a frozen memtable never reached disk;
    /// everything recovered is flushed to level 0 and a fresh generation
    /// started.
    fn recover(
        config: &Config,
        wal_dir: &Path,
        checkpoint: &FlushCheckpoint,
        memtable: &MemTable,
        tree: &TableTree,
    ) -> Result<ActiveWal> {
        let generations = Self::wal_generations(wal_dir)?;
        let flushed_lsn = checkpoint.load()?;

        let mut next_lsn = flushed_lsn + 1;
        let mut skipped = 0usize;
        for (generation, path) in &generations {
            let (entries, result) = WalRecovery::recover(path)?;
            if result.entries_recovered > 0 || result.was_truncated {
                tracing::info!(
                    generation,
                    recovered = result.entries_recovered,
                    truncated = result.was_truncated,
                    last_lsn = result.last_lsn,
                    "WAL recovery"
                );
            }
            for entry in entries {
                next_lsn = next_lsn.max(entry.lsn + 1);
                if entry.lsn <= flushed_lsn {
                    skipped += 1;
                    continue;
                }
                memtable.set(entry.record);
            }
        }
        if skipped > 0 {
            tracing::warn!(
                skipped,
                flushed_lsn,
                "Skipped WAL entries already flushed to SSTables"
            );
        }

        match generations.as_slice() {
            [] => {
                let path = Self::wal_path(wal_dir, 1);
                Ok(ActiveWal {
                    writer: WalWriter::resume(&path, config.wal_sync_strategy, next_lsn)?,
                    generation: 1,
                })
            }
            [(generation, path)] => Ok(ActiveWal {
                writer: WalWriter::resume(path, config.wal_sync_strategy, next_lsn)?,
                generation: *generation,
            }),
            [.., (last, _)] => {
                let recovered = memtable.swap();
                tree.flush(recovered.iter())?;
                checkpoint.store(next_lsn - 1)?;
                tracing::info!(
                    entries = recovered.len(),
                    generations = generations.len(),
                    "Flushed recovered WAL generations to level 0"
                );

                for (_, path) in &generations {
                    fs::remove_file(path)?;
                }

                let generation = last + 1;
                let path = Self::wal_path(wal_dir, generation);
                Ok(ActiveWal {
                    writer: WalWriter::resume(&path, config.wal_sync_strategy, next_lsn)?,
                    generation,
                })
            }
        }
    }

    /// All "wal_{generation}.log" files, sorted by generation
    fn wal_generations(wal_dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
        let mut generations = Vec::new();
        for entry in fs::read_dir(wal_dir)? {
            let path = entry?.path();
            let generation = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("wal_"))
                .and_then(|name| name.strip_suffix(".log"))
                .and_then(|id| id.parse::<u64>().ok());
            if let Some(generation) = generation {
                generations.push((generation, path));
            }
        }
        generations.sort_by_key(|(generation, _)| *generation);
        Ok(generations)
    }

    fn wal_path(wal_dir: &Path, generation: u64) -> PathBuf {
        wal_dir.join(format!("wal_{:06}.log", generation))
    }

    /// Get a value by key
    ///
    /// Search order:
    /// 1. Active memtable
    /// 2. Frozen memtable (being flushed)
    /// 3. Table tree, level 0 newest first, then deeper levels
    ///
    /// A tombstone at any stage means "not found".
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.core.ensure_open()?;
        let record = self.core.lookup(key)?;
        Ok(record.filter(|r| !r.deleted).map(|r| r.value))
    }

    /// Set a key to a value
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Write to WAL (durability guarantee)
    /// 3. Write to MemTable
    /// 4. Freeze and hand off for flush once a threshold is exceeded
    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write(ValueRecord::put(key, value))
    }

    /// Delete a key by writing a tombstone
    ///
    /// Space is reclaimed only by compaction.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.write(ValueRecord::tombstone(key))
    }

    fn write(&self, record: ValueRecord) -> Result<()> {
        self.core.ensure_open()?;
        if self.core.write(record)? {
            self.request_flush()?;
        }
        Ok(())
    }

    /// Typed view over this database using bincode for values
    pub fn collection<T>(&self) -> Collection<'_, T>
    where
        BincodeCodec: ValueCodec<T>,
    {
        Collection::new(self, BincodeCodec)
    }

    /// Typed view over this database with a caller-supplied codec
    pub fn collection_with<T, C: ValueCodec<T>>(&self, codec: C) -> Collection<'_, T, C> {
        Collection::new(self, codec)
    }

    /// Freeze the memtable and flush it to level 0 now
    pub fn flush(&self) -> Result<()> {
        self.core.ensure_open()?;
        {
            let mut wal = self.core.wal.lock();
            if !self.core.memtable.is_empty() {
                self.core.freeze(&mut wal)?;
            }
        }
        self.core.flush_frozen()
    }

    /// Compact every level that is over budget now
    pub fn compact(&self) -> Result<Vec<CompactionOutcome>> {
        self.core.ensure_open()?;
        self.core.tree.compact()
    }

    /// Close the database gracefully
    ///
    /// Stops the background worker, flushes the memtable and syncs the WAL.
    /// Every later operation on this handle fails with [`TierError::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.core.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_worker();
        if !self.core.memtable.is_empty() || self.core.frozen.read().is_some() {
            self.flush()?;
        }
        self.core.wal.lock().writer.sync()?;
        self.core.closed.store(true, Ordering::SeqCst);
        tracing::info!(data_dir = %self.core.config.data_dir.display(), "Database closed");
        Ok(())
    }

    fn request_flush(&self) -> Result<()> {
        match self.worker.lock().as_ref() {
            Some(worker) => {
                worker.request_flush();
                Ok(())
            }
            None => self.core.flush_frozen(),
        }
    }

    fn stop_worker(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.shutdown();
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.core.config.data_dir
    }

    /// Get the storage directory path (where SSTables are stored)
    pub fn storage_dir(&self) -> &Path {
        self.core.tree.dir()
    }

    /// Get the WAL directory path
    pub fn wal_dir(&self) -> &Path {
        &self.core.wal_dir
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.core.memtable.entry_count()
    }

    /// Get the number of SSTables across all levels
    pub fn sstable_count(&self) -> usize {
        self.core.tree.table_count()
    }

    /// Per-level table counts and sizes
    pub fn level_stats(&self) -> Vec<LevelStats> {
        self.core.tree.level_stats()
    }

    /// Outcome counters of background compaction
    pub fn compaction_status(&self) -> CompactionStatus {
        self.core.status.lock().clone()
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            memtable_entries: self.core.memtable.entry_count(),
            memtable_bytes: self.core.memtable.size(),
            frozen_entries: self.core.frozen.read().as_ref().map(|f| f.list.len()),
            wal_generation: self.core.wal.lock().generation,
            levels: self.core.tree.level_stats(),
            compaction: self.compaction_status(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.core.config
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Unflushed data stays in the WAL and is replayed on the next open
        self.stop_worker();
    }
}

impl EngineCore {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TierError::Closed);
        }
        Ok(())
    }

    /// Probe memtable, frozen memtable, then the tree
    fn lookup(&self, key: &str) -> Result<Option<ValueRecord>> {
        {
            let frozen = self.frozen.read();
            if let Some(record) = self.memtable.get(key) {
                return Ok(Some(record));
            }
            if let Some(record) = frozen.as_ref().and_then(|f| f.list.search(key)) {
                return Ok(Some(record.clone()));
            }
        }
        self.tree.get(key)
    }

    /// Append, apply, and freeze if needed. Returns whether a freeze happened.
    ///
    /// An error means the record was not written. Once the append succeeds
    /// the write is acknowledged; a failed freeze is logged and recorded in
    /// the status, and the next write tries again.
    fn write(&self, record: ValueRecord) -> Result<bool> {
        let mut wal = self.wal.lock();

        // Durability precedes visibility: nothing is applied if this fails
        wal.writer.append(&record)?;
        self.memtable.set(record);

        if !self
            .memtable
            .should_flush(self.config.memtable_threshold, self.config.memtable_size_limit)
        {
            return Ok(false);
        }

        match self.freeze(&mut wal) {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::error!(error = %e, "Failed to freeze memtable");
                let mut status = self.status.lock();
                status.flush_failures += 1;
                status.last_error = Some(e.to_string());
                Ok(false)
            }
        }
    }

    /// Swap in an empty memtable and a new WAL generation
    ///
    /// Called with the write lock held. If an earlier frozen memtable is
    /// still waiting, it is flushed here first.
    fn freeze(&self, wal: &mut ActiveWal) -> Result<()> {
        if self.frozen.read().is_some() {
            self.flush_frozen()?;
        }

        let generation = wal.generation + 1;
        let path = Self::wal_path_in(&self.wal_dir, generation);
        let next_lsn = wal.writer.current_lsn();
        let fresh = WalWriter::resume(&path, self.config.wal_sync_strategy, next_lsn)?;

        wal.writer.sync()?;
        let retired = std::mem::replace(&mut wal.writer, fresh);
        wal.generation = generation;

        let mut frozen = self.frozen.write();
        let list = self.memtable.swap();
        tracing::debug!(
            entries = list.len(),
            bytes = list.size(),
            wal_generation = generation,
            "Froze memtable"
        );
        *frozen = Some(Arc::new(FrozenMemTable {
            list,
            wal_path: retired.path().to_path_buf(),
            last_lsn: next_lsn.saturating_sub(1),
        }));
        Ok(())
    }

    /// Write the frozen memtable to level 0, then retire it and its WAL
    ///
    /// The checkpoint moves past the generation before the file is removed,
    /// so a generation that survives removal is skipped on the next open.
    /// On failure the frozen memtable stays readable and is retried later.
    pub(crate) fn flush_frozen(&self) -> Result<()> {
        let _guard = self.flush_lock.lock();

        let frozen = match self.frozen.read().clone() {
            Some(frozen) => frozen,
            None => return Ok(()),
        };

        self.tree.flush(frozen.list.iter())?;
        self.checkpoint.store(frozen.last_lsn)?;
        *self.frozen.write() = None;

        if let Err(e) = fs::remove_file(&frozen.wal_path) {
            tracing::warn!(
                path = %frozen.wal_path.display(),
                error = %e,
                "Failed to remove flushed WAL generation"
            );
        }
        Ok(())
    }

    /// One background pass: retry a pending flush, then compact
    pub(crate) fn background_pass(&self) {
        if let Err(e) = self.flush_frozen() {
            tracing::error!(error = %e, "Background flush failed");
            let mut status = self.status.lock();
            status.flush_failures += 1;
            status.last_error = Some(e.to_string());
        }

        if self.tree.needs_compaction().is_none() {
            return;
        }

        let result = self.tree.compact();
        let mut status = self.status.lock();
        status.passes += 1;
        match result {
            Ok(outcomes) => status.compactions += outcomes.len() as u64,
            Err(e) => {
                let e = TierError::Compaction(e.to_string());
                tracing::error!(error = %e, "Background compaction failed");
                status.failures += 1;
                status.last_error = Some(e.to_string());
            }
        }
    }

    pub(crate) fn check_interval(&self) -> std::time::Duration {
        self.config.check_interval
    }

    fn wal_path_in(wal_dir: &Path, generation: u64) -> PathBuf {
        Database::wal_path(wal_dir, generation)
    }
}
