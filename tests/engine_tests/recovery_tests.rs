//! Tests for startup recovery
//!
//! These tests verify:
//! - Interrupted compactions converge on reopen, at every Promote step
//! - Writes accepted during the interrupted compaction are kept
//! - Torn write-log tails are truncated
//! - Block checksum failures surface as corruption

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use stormkv::block::WriteBuffer;
use stormkv::{Config, Engine, StormError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn config(dir: &Path) -> Config {
    Config::builder().data_dir(dir).value_size(8).build()
}

fn open_engine(dir: &Path) -> Engine {
    Engine::open(config(dir)).unwrap()
}

fn value(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Write framed blocks holding `records` to a fresh file
fn write_blocks(path: &Path, records: &[(u32, u64)]) {
    let mut file = File::create(path).unwrap();
    let mut buffer = WriteBuffer::new(8).unwrap();
    for &(key, n) in records {
        buffer.add(key, &value(n), 0).unwrap();
    }
    buffer.flush(&mut file).unwrap();
    file.sync_all().unwrap();
}

fn append_bytes(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

/// Put `keys` with value `n`, then close
fn populate(dir: &Path, keys: std::ops::Range<u32>, n: u64) {
    let engine = open_engine(dir);
    for key in keys {
        engine.put(key, &value(n)).unwrap();
    }
    engine.close().unwrap();
}

fn assert_no_transient_files(dir: &Path) {
    for name in ["wal.next", "data.next", "wal.del", "data.del"] {
        assert!(!dir.join(name).exists(), "{} left behind", name);
    }
}

/// Every key exactly once, with the value `expected` gives for it
fn assert_contents(engine: &Engine, keys: usize, expected: impl Fn(u32) -> u64) {
    let mut seen = roaring::RoaringBitmap::new();
    engine
        .iterate(|key, v| {
            assert!(seen.insert(key), "key {} delivered twice", key);
            assert_eq!(v, &value(expected(key)), "iterate key {}", key);
        })
        .unwrap();
    assert_eq!(seen.len() as usize, keys);
    assert_eq!(engine.len(), keys);

    for key in seen.iter() {
        assert_eq!(
            engine.get(key).unwrap(),
            Some(value(expected(key)).to_vec()),
            "get key {}",
            key
        );
    }
}

// =============================================================================
// Interrupted Compaction Tests
// =============================================================================

#[test]
fn test_recover_crash_during_merge() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..300, 1);

    // Sealed: writes since then went to wal.next, data.next half written
    let next_wal: Vec<(u32, u64)> = (0..50)
        .map(|k| (k, 2))
        .chain((1000..1010).map(|k| (k, 3)))
        .collect();
    write_blocks(&dir.join("wal.next"), &next_wal);
    fs::write(dir.join("data.next"), [0xABu8; 700]).unwrap();

    let engine = open_engine(dir);

    assert_no_transient_files(dir);
    assert_eq!(engine.wal_bytes(), 0);
    assert_contents(&engine, 310, |key| match key {
        0..=49 => 2,
        1000..=1009 => 3,
        _ => 1,
    });
}

#[test]
fn test_recover_crash_after_seal_without_data_next() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..100, 1);

    write_blocks(&dir.join("wal.next"), &[(5, 9)]);

    let engine = open_engine(dir);

    assert_no_transient_files(dir);
    assert_contents(&engine, 100, |key| if key == 5 { 9 } else { 1 });
}

#[test]
fn test_recover_crash_after_wal_renamed() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..300, 1);

    write_blocks(&dir.join("wal.next"), &[(7, 2), (400, 2)]);
    write_blocks(&dir.join("data.next"), &[(0, 1)]);
    fs::rename(dir.join("wal"), dir.join("wal.del")).unwrap();

    let engine = open_engine(dir);

    assert_no_transient_files(dir);
    assert_contents(&engine, 301, |key| if key == 7 || key == 400 { 2 } else { 1 });
}

#[test]
fn test_recover_crash_after_data_renamed() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    {
        let engine = open_engine(dir);
        for key in 0..300u32 {
            engine.put(key, &value(1)).unwrap();
        }
        engine.compact().unwrap();
        for key in 0..100u32 {
            engine.put(key, &value(2)).unwrap();
        }
        engine.close().unwrap();
    }

    let next_wal: Vec<(u32, u64)> = (0..10).map(|k| (k, 3)).collect();
    write_blocks(&dir.join("wal.next"), &next_wal);
    write_blocks(&dir.join("data.next"), &[(0, 0)]);
    fs::rename(dir.join("wal"), dir.join("wal.del")).unwrap();
    fs::rename(dir.join("data"), dir.join("data.del")).unwrap();

    let engine = open_engine(dir);

    assert_no_transient_files(dir);
    assert_eq!(engine.wal_bytes(), 0);
    assert_contents(&engine, 300, |key| match key {
        0..=9 => 3,
        10..=99 => 2,
        _ => 1,
    });
}

#[test]
fn test_recover_crash_after_next_wal_renamed() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    {
        let engine = open_engine(dir);
        for key in 0..300u32 {
            engine.put(key, &value(1)).unwrap();
        }
        engine.compact().unwrap();
        for key in 0..100u32 {
            engine.put(key, &value(2)).unwrap();
        }
        engine.close().unwrap();
    }

    // The merge finished: data.next is the full compacted generation
    let merged: Vec<(u32, u64)> = (0..300u32)
        .map(|k| (k, if k < 100 { 2 } else { 1 }))
        .collect();
    write_blocks(&dir.join("data.next"), &merged);
    fs::rename(dir.join("wal"), dir.join("wal.del")).unwrap();
    fs::rename(dir.join("data"), dir.join("data.del")).unwrap();
    // wal.next, already renamed into place, holds one write made after the seal
    write_blocks(&dir.join("wal"), &[(5, 9)]);

    let engine = open_engine(dir);

    assert_no_transient_files(dir);
    assert_eq!(engine.wal_bytes(), engine.layout().block_size() as u64);
    assert_contents(&engine, 300, |key| match key {
        5 => 9,
        0..=99 => 2,
        _ => 1,
    });
}

#[test]
fn test_recover_leftover_deleted_files() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..50, 1);

    fs::write(dir.join("wal.del"), b"old").unwrap();
    fs::write(dir.join("data.del"), b"old").unwrap();

    let engine = open_engine(dir);

    assert_no_transient_files(dir);
    assert_contents(&engine, 50, |_| 1);
}

#[test]
fn test_recovered_database_accepts_writes() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..100, 1);
    write_blocks(&dir.join("wal.next"), &[(1, 2)]);
    fs::write(dir.join("data.next"), b"partial").unwrap();

    {
        let engine = open_engine(dir);
        engine.put(2, &value(3)).unwrap();
        engine.compact().unwrap();
        engine.put(3, &value(4)).unwrap();
        engine.close().unwrap();
    }

    let engine = open_engine(dir);
    assert_contents(&engine, 100, |key| match key {
        1 => 2,
        2 => 3,
        3 => 4,
        _ => 1,
    });
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_torn_wal_tail_truncated() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..10, 1);
    append_bytes(&dir.join("wal"), &[0x42u8; 100]);

    let engine = open_engine(dir);
    let block_size = engine.layout().block_size() as u64;

    assert_eq!(engine.wal_bytes(), block_size);
    assert_eq!(fs::metadata(dir.join("wal")).unwrap().len(), block_size);
    assert_contents(&engine, 10, |_| 1);
}

#[test]
fn test_torn_next_wal_tail_truncated() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..10, 1);

    let next_wal = dir.join("wal.next");
    write_blocks(&next_wal, &[(20, 2)]);
    append_bytes(&next_wal, &[0u8; 37]);

    let engine = open_engine(dir);

    assert_no_transient_files(dir);
    assert_contents(&engine, 11, |key| if key == 20 { 2 } else { 1 });
}

// =============================================================================
// Checksum Tests
// =============================================================================

#[test]
fn test_corrupt_block_fails_open() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..10, 1);

    let wal = dir.join("wal");
    let mut bytes = fs::read(&wal).unwrap();
    bytes[6] ^= 0x01;
    fs::write(&wal, &bytes).unwrap();

    let result = Engine::open(config(dir));
    assert!(matches!(result, Err(StormError::Corruption(_))));
}

#[test]
fn test_corrupt_block_opens_without_verification() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    populate(dir, 0..10, 1);

    let wal = dir.join("wal");
    let mut bytes = fs::read(&wal).unwrap();
    // Damage padding only; every live record stays intact
    let tail = bytes.len() - 10;
    bytes[tail] ^= 0x01;
    fs::write(&wal, &bytes).unwrap();

    let config = Config::builder()
        .data_dir(dir)
        .value_size(8)
        .verify_checksums(false)
        .build();
    let engine = Engine::open(config).unwrap();

    assert_contents(&engine, 10, |_| 1);
}
