//! WAL Reader Tests

use std::fs::OpenOptions;
use std::io::Write;

use tempfile::TempDir;
use tierkv::wal::{WalReader, WalWriter};
use tierkv::{TierError, ValueRecord, WalSyncStrategy};

fn write_entries(path: &std::path::Path, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer
            .append(&ValueRecord::put(format!("key{:03}", i), format!("value{}", i)))
            .unwrap();
    }
}

#[test]
fn test_empty_log() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wal.log");
    std::fs::File::create(&path).unwrap();

    let mut reader = WalReader::open(&path).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), 0);
}

#[test]
fn test_reads_entries_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wal.log");
    write_entries(&path, 20);

    let mut reader = WalReader::open(&path).unwrap();
    let mut expected_lsn = 1;
    while let Some(entry) = reader.next_entry().unwrap() {
        assert_eq!(entry.lsn, expected_lsn);
        assert_eq!(entry.record.key, format!("key{:03}", expected_lsn - 1));
        expected_lsn += 1;
    }
    assert_eq!(expected_lsn, 21);
    assert_eq!(reader.position(), std::fs::metadata(&path).unwrap().len());
}

#[test]
fn test_trailing_garbage_is_corruption() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("wal.log");
    write_entries(&path, 3);
    let valid_len = std::fs::metadata(&path).unwrap().len();

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xAB; 5]).unwrap();

    let mut iter = WalReader::open(&path).unwrap().entries();
    for _ in 0..3 {
        assert!(iter.next().unwrap().is_ok());
    }
    assert!(matches!(iter.next(), Some(Err(TierError::WalCorruption(_)))));
    assert!(iter.next().is_none());

    let mut reader = WalReader::open(&path).unwrap();
    while let Ok(Some(_)) = reader.next_entry() {}
    assert_eq!(reader.position(), valid_len);
}
