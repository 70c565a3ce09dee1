//! SSTable Tests
//!
//! Tests verify:
//! - Builder → reader round trip through the sparse index
//! - Keys never inserted are reported missing, including keys inside the range
//! - Tombstones persist as tombstones
//! - Key ordering is enforced at build time
//! - Checksum verification catches corrupted data

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::TempDir;
use tierkv::storage::{SSTable, SSTableBuilder, SSTableReader};
use tierkv::{TierError, ValueRecord};

// =============================================================================
// Helper Functions
// =============================================================================

fn key(i: usize) -> String {
    format!("key{:05}", i)
}

/// Build a table of even-numbered keys `0, 2, ... 2 * (count - 1)`
fn build_even(path: &Path, count: usize, interval: usize) {
    let mut builder = SSTableBuilder::new(path, interval).unwrap();
    for i in 0..count {
        builder
            .add(&ValueRecord::put(key(i * 2), format!("value{}", i * 2)))
            .unwrap();
    }
    builder.finish().unwrap();
}

// =============================================================================
// Build / Read Tests
// =============================================================================

#[test]
fn test_finish_reports_summary() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");

    let mut builder = SSTableBuilder::new(&path, 4).unwrap();
    for i in 0..10 {
        builder.add(&ValueRecord::put(key(i), vec![i as u8])).unwrap();
    }
    assert_eq!(builder.entry_count(), 10);
    let info = builder.finish().unwrap();

    assert_eq!(info.entry_count, 10);
    assert_eq!(info.min_key, key(0));
    assert_eq!(info.max_key, key(9));
    // Records 0, 4, 8 plus the final record
    assert_eq!(info.index_entries, 4);
    assert_eq!(info.file_size, fs::metadata(&path).unwrap().len());
}

#[test]
fn test_every_record_is_found() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");
    build_even(&path, 500, 16);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 500);
    assert_eq!(reader.min_key(), Some(key(0).as_str()));
    assert_eq!(reader.max_key(), Some(key(998).as_str()));

    for i in 0..500 {
        let record = reader.get(&key(i * 2)).unwrap();
        assert_eq!(record.value, format!("value{}", i * 2).into_bytes());
    }
}

#[test]
fn test_missing_keys_are_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");
    build_even(&path, 200, 8);

    let reader = SSTableReader::open(&path).unwrap();

    // Odd keys fall between stored keys
    for i in (1..400).step_by(2) {
        assert!(matches!(reader.get(&key(i)), Err(TierError::KeyNotFound)));
    }
    // Outside the range on either side
    assert!(matches!(reader.get("a"), Err(TierError::KeyNotFound)));
    assert!(matches!(reader.get("zzz"), Err(TierError::KeyNotFound)));
    assert!(!reader.might_contain("zzz"));
}

#[test]
fn test_single_record_table() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");

    let mut builder = SSTableBuilder::new(&path, 16).unwrap();
    builder.add(&ValueRecord::put("only", b"one".to_vec())).unwrap();
    let info = builder.finish().unwrap();
    assert_eq!(info.index_entries, 1);

    let table = SSTable::open(&path, 1, 0).unwrap();
    assert_eq!(table.get("only").unwrap().unwrap().value, b"one".to_vec());
    assert_eq!(table.get("other").unwrap(), None);
    assert_eq!(table.min_key(), "only");
    assert_eq!(table.max_key(), "only");
}

#[test]
fn test_tombstones_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");

    let mut builder = SSTableBuilder::new(&path, 2).unwrap();
    builder.add(&ValueRecord::put("a", b"1".to_vec())).unwrap();
    builder.add(&ValueRecord::tombstone("b")).unwrap();
    builder.add(&ValueRecord::put("c", Vec::new())).unwrap();
    builder.finish().unwrap();

    let table = SSTable::open(&path, 7, 0).unwrap();
    let b = table.get("b").unwrap().unwrap();
    assert!(b.deleted);

    // An empty value is not a tombstone
    let c = table.get("c").unwrap().unwrap();
    assert!(!c.deleted);
    assert!(c.value.is_empty());
}

#[test]
fn test_iter_yields_all_records_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");
    build_even(&path, 100, 7);

    let table = SSTable::open(&path, 1, 0).unwrap();
    let records: Vec<ValueRecord> = table.iter().unwrap().collect::<Result<_, _>>().unwrap();

    assert_eq!(records.len(), 100);
    assert!(records.windows(2).all(|w| w[0].key < w[1].key));
    assert_eq!(records[0].key, key(0));
    assert_eq!(records[99].key, key(198));
}

#[test]
fn test_overlaps() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");
    build_even(&path, 10, 4); // key00000 ..= key00018

    let table = SSTable::open(&path, 1, 1).unwrap();
    assert!(table.overlaps("a", "key00000"));
    assert!(table.overlaps("key00005", "key00006"));
    assert!(table.overlaps("key00018", "z"));
    assert!(!table.overlaps("key00019", "z"));
    assert!(!table.overlaps("a", "b"));
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_out_of_order_keys_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");

    let mut builder = SSTableBuilder::new(&path, 4).unwrap();
    builder.add(&ValueRecord::put("b", vec![])).unwrap();

    assert!(builder.add(&ValueRecord::put("a", vec![])).is_err());
    assert!(builder.add(&ValueRecord::put("b", vec![])).is_err());
    builder.abandon();
    assert!(!path.exists());
}

#[test]
fn test_empty_table_cannot_finish() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");

    let builder = SSTableBuilder::new(&path, 4).unwrap();
    assert!(matches!(builder.finish(), Err(TierError::Storage(_))));
}

#[test]
fn test_bad_magic_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");
    fs::write(&path, vec![0u8; 64]).unwrap();

    assert!(SSTableReader::open(&path).is_err());
}

#[test]
fn test_verify_detects_flipped_byte() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");
    build_even(&path, 50, 8);

    let table = SSTable::open(&path, 1, 0).unwrap();
    table.verify().unwrap();
    drop(table);

    // Flip a byte inside the first record's value
    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(14 + 8 + 8)).unwrap();
    file.write_all(b"X").unwrap();
    drop(file);

    let table = SSTable::open(&path, 1, 0).unwrap();
    assert!(table.verify().is_err());
}

#[test]
fn test_dropping_live_table_keeps_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("t.sst");
    build_even(&path, 5, 2);

    drop(SSTable::open(&path, 1, 0).unwrap());
    assert!(path.exists());
}
