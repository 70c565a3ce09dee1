//! Crash Recovery Tests
//!
//! A handle dropped without `close()` models a crash: the memtable is lost
//! and only the WAL and published SSTables survive.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tierkv::wal::WalWriter;
use tierkv::{Config, Database, ValueRecord, WalSyncStrategy};

fn config_for(dir: &Path, threshold: usize) -> Config {
    Config::builder()
        .data_dir(dir)
        .wal_sync_strategy(WalSyncStrategy::EveryWrite)
        .memtable_threshold(threshold)
        .build()
        .unwrap()
}

fn wal_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<_> = fs::read_dir(dir.join("wal"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "log"))
        .collect();
    files.sort();
    files
}

#[test]
fn test_recover_unflushed_writes() {
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
        db.set("a", b"v1").unwrap();
        db.set("a", b"v2").unwrap();
        db.set("b", b"keep").unwrap();
        db.set("c", b"gone").unwrap();
        db.delete("c").unwrap();
        // Dropped without close
    }

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();

    assert_eq!(db.sstable_count(), 0);
    assert_eq!(db.memtable_entry_count(), 3);
    assert_eq!(db.get("a").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(db.get("b").unwrap(), Some(b"keep".to_vec()));
    assert_eq!(db.get("c").unwrap(), None);
}

#[test]
fn test_writes_after_recovery_survive_second_crash() {
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
        db.set("first", b"1").unwrap();
    }
    {
        let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
        db.set("second", b"2").unwrap();
    }

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
    assert_eq!(db.get("first").unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.get("second").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn test_recover_mix_of_tables_and_wal() {
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
        for i in 0..50 {
            db.set(&format!("key{:02}", i), b"flushed").unwrap();
        }
        db.flush().unwrap();
        for i in 25..50 {
            db.set(&format!("key{:02}", i), b"logged").unwrap();
        }
        db.delete("key00").unwrap();
    }

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();

    assert_eq!(db.sstable_count(), 1);
    assert_eq!(db.get("key00").unwrap(), None);
    assert_eq!(db.get("key10").unwrap(), Some(b"flushed".to_vec()));
    assert_eq!(db.get("key30").unwrap(), Some(b"logged".to_vec()));
}

#[test]
fn test_torn_wal_tail_is_ignored() {
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
        for i in 0..10 {
            db.set(&format!("key{}", i), b"v").unwrap();
        }
    }

    let logs = wal_files(temp_dir.path());
    assert_eq!(logs.len(), 1);
    let mut file = OpenOptions::new().append(true).open(&logs[0]).unwrap();
    file.write_all(&[0x2A; 11]).unwrap();
    drop(file);

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
    assert_eq!(db.memtable_entry_count(), 10);

    // Appends continue cleanly after the truncated tail
    db.set("after", b"crash").unwrap();
    drop(db);

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
    assert_eq!(db.memtable_entry_count(), 11);
    assert_eq!(db.get("after").unwrap(), Some(b"crash".to_vec()));
}

#[test]
fn test_pending_generations_flushed_on_open() {
    let temp_dir = TempDir::new().unwrap();
    let wal_dir = temp_dir.path().join("wal");
    fs::create_dir_all(&wal_dir).unwrap();

    // Generation 1 belongs to a frozen memtable whose flush never finished
    {
        let mut wal =
            WalWriter::open(&wal_dir.join("wal_000001.log"), WalSyncStrategy::EveryWrite).unwrap();
        wal.append(&ValueRecord::put("a", b"old".to_vec())).unwrap();
        wal.append(&ValueRecord::put("b", b"old".to_vec())).unwrap();
    }
    {
        let mut wal =
            WalWriter::resume(&wal_dir.join("wal_000002.log"), WalSyncStrategy::EveryWrite, 3)
                .unwrap();
        wal.append(&ValueRecord::put("a", b"new".to_vec())).unwrap();
        wal.append(&ValueRecord::tombstone("b")).unwrap();
        wal.append(&ValueRecord::put("c", b"newest".to_vec())).unwrap();
    }

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();

    assert_eq!(db.sstable_count(), 1);
    assert_eq!(db.memtable_entry_count(), 0);
    assert_eq!(db.stats().wal_generation, 3);
    assert_eq!(wal_files(temp_dir.path()), vec![wal_dir.join("wal_000003.log")]);

    assert_eq!(db.get("a").unwrap(), Some(b"new".to_vec()));
    assert_eq!(db.get("b").unwrap(), None);
    assert_eq!(db.get("c").unwrap(), Some(b"newest".to_vec()));
}

#[test]
fn test_crash_with_frozen_memtables() {
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Database::open(config_for(temp_dir.path(), 5)).unwrap();
        for i in 0..23 {
            db.set(&format!("key{:02}", i), format!("v{}", i).as_bytes()).unwrap();
        }
        db.set("key03", b"rewritten").unwrap();
    }

    let db = Database::open(config_for(temp_dir.path(), 5)).unwrap();

    for i in 0..23 {
        let expected = if i == 3 {
            b"rewritten".to_vec()
        } else {
            format!("v{}", i).into_bytes()
        };
        assert_eq!(db.get(&format!("key{:02}", i)).unwrap(), Some(expected));
    }
}

#[test]
fn test_leftover_flushed_generation_does_not_shadow_newer_data() {
    let temp_dir = TempDir::new().unwrap();
    let wal_dir = temp_dir.path().join("wal");
    let saved = temp_dir.path().join("wal_000001.saved");

    {
        let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
        db.set("a", b"old").unwrap();
        fs::copy(wal_dir.join("wal_000001.log"), &saved).unwrap();
        db.flush().unwrap();

        db.set("a", b"new").unwrap();
        db.flush().unwrap();
    }

    // The generation comes back as if its removal had failed after the flush
    fs::copy(&saved, wal_dir.join("wal_000001.log")).unwrap();

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
    assert_eq!(db.get("a").unwrap(), Some(b"new".to_vec()));
    assert_eq!(db.memtable_entry_count(), 0);
    drop(db);

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
    assert_eq!(db.get("a").unwrap(), Some(b"new".to_vec()));
}

#[test]
fn test_writes_after_clean_close_are_not_mistaken_for_flushed() {
    let temp_dir = TempDir::new().unwrap();

    {
        let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
        db.set("a", b"1").unwrap();
        db.set("b", b"2").unwrap();
        db.close().unwrap();
    }
    {
        let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
        db.set("a", b"3").unwrap();
        db.set("c", b"4").unwrap();
    }

    let db = Database::open(config_for(temp_dir.path(), 1000)).unwrap();
    assert_eq!(db.memtable_entry_count(), 2);
    assert_eq!(db.get("a").unwrap(), Some(b"3".to_vec()));
    assert_eq!(db.get("b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.get("c").unwrap(), Some(b"4".to_vec()));
}
