//! TableTree Tests
//!
//! Tests verify:
//! - Flushing sorted records creates level 0 tables
//! - A failed flush leaves no file behind
//! - Newer level 0 tables shadow older ones
//! - Reopening rediscovers every table and continues id allocation
//! - Startup cleans staging files and superseded tables

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tierkv::storage::{SSTableBuilder, TableTree};
use tierkv::{Config, ValueRecord};

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .level0_max_tables(2)
        .index_interval(4)
        .build()
        .unwrap()
}

fn puts(range: std::ops::Range<usize>, tag: &str) -> Vec<ValueRecord> {
    range
        .map(|i| ValueRecord::put(format!("key{:04}", i), format!("{}-{}", tag, i)))
        .collect()
}

fn table_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

fn write_raw_table(path: &Path, records: &[ValueRecord]) {
    let mut builder = SSTableBuilder::new(path, 4).unwrap();
    for record in records {
        builder.add(record).unwrap();
    }
    builder.finish().unwrap();
}

// =============================================================================
// Flush Tests
// =============================================================================

#[test]
fn test_open_empty_directory() {
    let temp_dir = TempDir::new().unwrap();
    let tree = TableTree::open(temp_dir.path(), test_config(temp_dir.path())).unwrap();

    assert_eq!(tree.table_count(), 0);
    assert_eq!(tree.next_table_id(), 1);
    assert_eq!(tree.get("anything").unwrap(), None);
    assert_eq!(tree.level_stats().len(), 7);
    assert_eq!(tree.needs_compaction(), None);
}

#[test]
fn test_flush_creates_level0_table() {
    let temp_dir = TempDir::new().unwrap();
    let tree = TableTree::open(temp_dir.path(), test_config(temp_dir.path())).unwrap();

    let records = puts(0..50, "v1");
    let table = tree.flush(&records).unwrap().unwrap();

    assert_eq!(table.level(), 0);
    assert_eq!(table.entry_count(), 50);
    assert!(table.path().ends_with("L0_000001.sst"));
    assert_eq!(tree.level_stats()[0].tables, 1);

    let record = tree.get("key0025").unwrap().unwrap();
    assert_eq!(record.value, b"v1-25".to_vec());
    assert_eq!(tree.get("key0050").unwrap(), None);
}

#[test]
fn test_flush_of_nothing_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let tree = TableTree::open(temp_dir.path(), test_config(temp_dir.path())).unwrap();

    assert!(tree.flush(&Vec::<ValueRecord>::new()).unwrap().is_none());
    assert_eq!(tree.table_count(), 0);
    assert!(table_files(temp_dir.path()).is_empty());
}

#[test]
fn test_failed_flush_removes_staging_file() {
    let temp_dir = TempDir::new().unwrap();
    let tree = TableTree::open(temp_dir.path(), test_config(temp_dir.path())).unwrap();

    let unsorted = vec![
        ValueRecord::put("key0002", b"b".to_vec()),
        ValueRecord::put("key0001", b"a".to_vec()),
    ];
    assert!(tree.flush(&unsorted).is_err());

    assert_eq!(tree.table_count(), 0);
    assert!(table_files(temp_dir.path()).is_empty());

    // The tree stays usable after the failure
    let table = tree.flush(&puts(0..3, "ok")).unwrap().unwrap();
    assert_eq!(table.entry_count(), 3);
    assert_eq!(table_files(temp_dir.path()), vec![table.path().to_path_buf()]);
}

#[test]
fn test_newest_level0_table_wins() {
    let temp_dir = TempDir::new().unwrap();
    let tree = TableTree::open(temp_dir.path(), test_config(temp_dir.path())).unwrap();

    tree.flush(&puts(0..20, "old")).unwrap();
    tree.flush(&[ValueRecord::put("key0005", b"new".to_vec()), ValueRecord::tombstone("key0006")])
        .unwrap();

    assert_eq!(tree.get("key0005").unwrap().unwrap().value, b"new".to_vec());
    assert!(tree.get("key0006").unwrap().unwrap().deleted);
    assert_eq!(tree.get("key0007").unwrap().unwrap().value, b"old-7".to_vec());
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_rediscovers_tables() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());

    {
        let tree = TableTree::open(temp_dir.path(), config.clone()).unwrap();
        tree.flush(&puts(0..30, "a")).unwrap();
        tree.flush(&puts(10..40, "b")).unwrap();
        tree.flush(&puts(20..50, "c")).unwrap();
        tree.compact_level(0).unwrap();
        tree.flush(&puts(0..5, "d")).unwrap();
    }

    let tree = TableTree::open(temp_dir.path(), config).unwrap();
    let stats = tree.level_stats();
    assert_eq!(stats[0].tables, 1);
    assert_eq!(stats[1].tables, 1);
    assert!(tree.next_table_id() > 5);

    assert_eq!(tree.get("key0001").unwrap().unwrap().value, b"d-1".to_vec());
    assert_eq!(tree.get("key0015").unwrap().unwrap().value, b"b-15".to_vec());
    assert_eq!(tree.get("key0045").unwrap().unwrap().value, b"c-45".to_vec());
}

#[test]
fn test_open_removes_staging_files() {
    let temp_dir = TempDir::new().unwrap();
    let staging = temp_dir.path().join("L0_000003.sst.tmp");
    fs::write(&staging, b"partial").unwrap();

    let tree = TableTree::open(temp_dir.path(), test_config(temp_dir.path())).unwrap();

    assert!(!staging.exists());
    assert_eq!(tree.table_count(), 0);
}

#[test]
fn test_open_ignores_unrelated_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("notes.txt"), b"hello").unwrap();

    let tree = TableTree::open(temp_dir.path(), test_config(temp_dir.path())).unwrap();
    assert_eq!(tree.table_count(), 0);
    assert!(temp_dir.path().join("notes.txt").exists());
}

#[test]
fn test_open_drops_superseded_deep_tables() {
    let temp_dir = TempDir::new().unwrap();

    // An interrupted compaction: output 9 was renamed, consumed table 5 survived
    let stale = temp_dir.path().join("L1_000005.sst");
    let fresh = temp_dir.path().join("L1_000009.sst");
    write_raw_table(&stale, &puts(0..10, "stale"));
    write_raw_table(&fresh, &puts(0..20, "fresh"));
    write_raw_table(&temp_dir.path().join("L1_000004.sst"), &puts(50..60, "other"));

    let tree = TableTree::open(temp_dir.path(), test_config(temp_dir.path())).unwrap();

    assert_eq!(tree.level_stats()[1].tables, 2);
    assert!(!stale.exists());
    assert!(fresh.exists());
    assert_eq!(tree.get("key0003").unwrap().unwrap().value, b"fresh-3".to_vec());
    assert_eq!(tree.get("key0055").unwrap().unwrap().value, b"other-55".to_vec());
    assert_eq!(tree.next_table_id(), 10);
}

#[test]
fn test_open_rejects_level_beyond_configuration() {
    let temp_dir = TempDir::new().unwrap();
    write_raw_table(&temp_dir.path().join("L9_000001.sst"), &puts(0..3, "x"));

    assert!(TableTree::open(temp_dir.path(), test_config(temp_dir.path())).is_err());
}
