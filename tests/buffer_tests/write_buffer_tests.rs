//! Tests for WriteBuffer
//!
//! These tests verify:
//! - Capacity for small, medium and oversized values
//! - Value size validation
//! - Dirty/full state transitions
//! - Block framing: padding with sync markers and CRC32 trailers
//! - Reads of pending records and snapshots

use stormkv::block::{BlockLayout, WriteBuffer, MAX_VALUE_SIZE, RECORDS_PER_BLOCK, RESERVED_KEY};
use stormkv::StormError;

// =============================================================================
// Helper Functions
// =============================================================================

fn value_of(seed: u32, value_size: usize) -> Vec<u8> {
    (0..value_size)
        .map(|i| (seed as usize).wrapping_mul(31).wrapping_add(i) as u8)
        .collect()
}

fn fill(buffer: &mut WriteBuffer, count: usize) {
    let value_size = buffer.layout().value_size();
    for key in 0..count as u32 {
        buffer.add(key, &value_of(key, value_size), 0).unwrap();
    }
}

fn block_crc(block: &[u8]) -> u32 {
    let records_end = block.len() - 4;
    u32::from_be_bytes(block[records_end..].try_into().unwrap())
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_capacity_for_small_values() {
    // (4 MB / 14 bytes per record) / 128 = 2340 blocks of 1796 bytes
    let buffer = WriteBuffer::new(10).unwrap();
    assert_eq!(buffer.capacity(), 2340 * 1796);
    assert_eq!(buffer.max_records(), 2340 * RECORDS_PER_BLOCK);

    let buffer = WriteBuffer::new(1).unwrap();
    assert_eq!(buffer.capacity(), 6553 * 644);

    let buffer = WriteBuffer::new(36).unwrap();
    assert_eq!(buffer.capacity(), 819 * 5124);
}

#[test]
fn test_capacity_for_medium_values() {
    let buffer = WriteBuffer::new(1024).unwrap();
    assert_eq!(buffer.capacity(), 31 * 131_588);
    assert_eq!(buffer.max_records(), 31 * RECORDS_PER_BLOCK);
}

#[test]
fn test_capacity_is_one_block_for_large_values() {
    for value_size in [16 * 1024, 128 * 1024, 256 * 1024, MAX_VALUE_SIZE] {
        let buffer = WriteBuffer::new(value_size).unwrap();
        let layout = BlockLayout::new(value_size).unwrap();

        assert_eq!(buffer.capacity(), layout.block_size());
        assert_eq!(buffer.max_records(), RECORDS_PER_BLOCK);
    }

    let buffer = WriteBuffer::new(MAX_VALUE_SIZE).unwrap();
    assert_eq!(buffer.capacity(), 67_109_380);
}

#[test]
fn test_capacity_is_whole_blocks() {
    for value_size in [1, 3, 7, 8, 13, 100, 999, 4096, 65_536] {
        let buffer = WriteBuffer::new(value_size).unwrap();
        let block_size = buffer.layout().block_size();

        assert!(buffer.capacity() >= block_size);
        assert_eq!(buffer.capacity() % block_size, 0);
    }
}

#[test]
fn test_value_size_too_large_rejected() {
    let result = WriteBuffer::new(MAX_VALUE_SIZE + 1);
    assert!(matches!(
        result,
        Err(StormError::ValueSizeTooLarge { size, max }) if size == MAX_VALUE_SIZE + 1 && max == MAX_VALUE_SIZE
    ));
}

#[test]
fn test_zero_value_size_rejected() {
    assert!(matches!(WriteBuffer::new(0), Err(StormError::Config(_))));
}

// =============================================================================
// State Tests
// =============================================================================

#[test]
fn test_new_buffer_is_clean() {
    let buffer = WriteBuffer::new(8).unwrap();

    assert!(!buffer.is_dirty());
    assert!(!buffer.is_full());
    assert!(buffer.is_empty());
    assert_eq!(buffer.pending_bytes(), 0);
    assert_eq!(buffer.array().len(), buffer.capacity());
}

#[test]
fn test_add_marks_dirty_and_flush_cleans() {
    let mut buffer = WriteBuffer::new(8).unwrap();

    buffer.add(1, &[7u8; 8], 0).unwrap();
    assert!(buffer.is_dirty());
    assert_eq!(buffer.len(), 1);

    let mut sink = Vec::new();
    buffer.flush(&mut sink).unwrap();

    assert!(!buffer.is_dirty());
    assert!(buffer.is_empty());
}

#[test]
fn test_full_at_max_records() {
    let mut buffer = WriteBuffer::new(1024).unwrap();
    let max = buffer.max_records();

    fill(&mut buffer, max - 1);
    assert!(!buffer.is_full());

    buffer.add(9999, &[0u8; 1024], 0).unwrap();
    assert!(buffer.is_full());
}

#[test]
fn test_add_when_full_fails() {
    let mut buffer = WriteBuffer::new(MAX_VALUE_SIZE).unwrap();
    fill(&mut buffer, RECORDS_PER_BLOCK);
    assert!(buffer.is_full());

    let result = buffer.add(1, &vec![0u8; MAX_VALUE_SIZE], 0);
    assert!(matches!(result, Err(StormError::BufferFull)));
    assert_eq!(buffer.len(), RECORDS_PER_BLOCK);
}

#[test]
fn test_add_short_value_fails() {
    let mut buffer = WriteBuffer::new(8).unwrap();

    let result = buffer.add(1, &[0u8; 7], 0);
    assert!(matches!(
        result,
        Err(StormError::InvalidValueLength { expected: 8, actual: 7 })
    ));

    // Enough bytes overall, but not past the offset
    let result = buffer.add(1, &[0u8; 10], 4);
    assert!(matches!(
        result,
        Err(StormError::InvalidValueLength { expected: 8, actual: 6 })
    ));
    assert!(!buffer.is_dirty());
}

#[test]
fn test_add_returns_record_offsets() {
    let mut buffer = WriteBuffer::new(8).unwrap();
    let layout = buffer.layout();

    for ordinal in 0..(RECORDS_PER_BLOCK as u64 + 2) {
        let offset = buffer.add(ordinal as u32, &[0u8; 8], 0).unwrap();
        assert_eq!(offset as u64, layout.offset_of(ordinal));
    }

    // The 129th record starts after the first block's trailer
    assert_eq!(layout.offset_of(RECORDS_PER_BLOCK as u64), layout.block_size() as u64);
}

#[test]
fn test_add_copies_from_offset() {
    let mut buffer = WriteBuffer::new(4).unwrap();

    let source = [9u8, 9, 1, 2, 3, 4, 9];
    let offset = buffer.add(5, &source, 2).unwrap();

    let (key, value) = buffer.record_at(offset).unwrap();
    assert_eq!(key, 5);
    assert_eq!(value, &[1, 2, 3, 4]);
}

// =============================================================================
// Flush / Framing Tests
// =============================================================================

#[test]
fn test_flush_empty_writes_nothing() {
    let mut buffer = WriteBuffer::new(8).unwrap();
    let mut sink = Vec::new();

    assert_eq!(buffer.flush(&mut sink).unwrap(), 0);
    assert!(sink.is_empty());
}

#[test]
fn test_flush_pads_partial_block() {
    let mut buffer = WriteBuffer::new(8).unwrap();
    let layout = buffer.layout();

    buffer.add(28, &[0x11u8; 8], 0).unwrap();

    let mut sink = Vec::new();
    let written = buffer.flush(&mut sink).unwrap();

    assert_eq!(written, layout.block_size());
    assert_eq!(sink.len(), layout.block_size());

    let records: Vec<(u32, Vec<u8>)> = layout
        .records(&sink)
        .map(|(key, value)| (key, value.to_vec()))
        .collect();
    assert_eq!(records.len(), RECORDS_PER_BLOCK);
    assert_eq!(records[0], (28, vec![0x11u8; 8]));
    for (key, value) in &records[1..] {
        assert_eq!(*key, RESERVED_KEY);
        assert_eq!(value, &vec![0xFFu8; 8]);
    }

    assert_eq!(
        block_crc(&sink),
        crc32fast::hash(&sink[..layout.records_size()])
    );
    assert!(layout.verify_block(&sink));
}

#[test]
fn test_flush_full_block_has_no_padding() {
    let mut buffer = WriteBuffer::new(16).unwrap();
    let layout = buffer.layout();

    fill(&mut buffer, RECORDS_PER_BLOCK);

    let mut sink = Vec::new();
    let written = buffer.flush(&mut sink).unwrap();
    assert_eq!(written, layout.block_size());

    assert!(layout.records(&sink).all(|(key, _)| key != RESERVED_KEY));
    assert_eq!(
        block_crc(&sink),
        crc32fast::hash(&sink[..layout.records_size()])
    );
}

#[test]
fn test_flush_multiple_blocks() {
    let mut buffer = WriteBuffer::new(8).unwrap();
    let layout = buffer.layout();

    fill(&mut buffer, 300);

    let mut sink = Vec::new();
    let written = buffer.flush(&mut sink).unwrap();
    assert_eq!(written, 3 * layout.block_size());

    let mut keys = Vec::new();
    for block in sink.chunks_exact(layout.block_size()) {
        assert!(layout.verify_block(block));
        keys.extend(layout.records(block).map(|(key, _)| key));
    }

    let live: Vec<u32> = keys.iter().copied().filter(|&k| k != RESERVED_KEY).collect();
    assert_eq!(live, (0..300).collect::<Vec<u32>>());
    assert_eq!(keys.len() - live.len(), 3 * RECORDS_PER_BLOCK - 300);
}

#[test]
fn test_flush_then_reuse() {
    let mut buffer = WriteBuffer::new(8).unwrap();

    buffer.add(1, &[1u8; 8], 0).unwrap();
    let mut first = Vec::new();
    buffer.flush(&mut first).unwrap();

    buffer.add(2, &[2u8; 8], 0).unwrap();
    let mut second = Vec::new();
    buffer.flush(&mut second).unwrap();

    let layout = buffer.layout();
    let (key, value) = layout.records(&second).next().unwrap();
    assert_eq!(key, 2);
    assert_eq!(value, &[2u8; 8]);
    assert!(layout.verify_block(&second));
}

#[test]
fn test_pending_bytes_rounds_up_to_blocks() {
    let mut buffer = WriteBuffer::new(8).unwrap();
    let block_size = buffer.layout().block_size();

    fill(&mut buffer, 1);
    assert_eq!(buffer.pending_bytes(), block_size);

    fill(&mut buffer, RECORDS_PER_BLOCK);
    assert_eq!(buffer.pending_bytes(), 2 * block_size);
}

// =============================================================================
// Pending Record Tests
// =============================================================================

#[test]
fn test_record_at_only_sees_written_records() {
    let mut buffer = WriteBuffer::new(8).unwrap();

    let offset = buffer.add(77, &[3u8; 8], 0).unwrap();
    assert_eq!(buffer.record_at(offset), Some((77, &[3u8; 8][..])));

    let next = buffer.layout().offset_of(1) as usize;
    assert_eq!(buffer.record_at(next), None);
}

#[test]
fn test_snapshot_is_newest_first() {
    let mut buffer = WriteBuffer::new(8).unwrap();
    buffer.add(1, &[1u8; 8], 0).unwrap();
    buffer.add(2, &[2u8; 8], 0).unwrap();
    buffer.add(1, &[3u8; 8], 0).unwrap();

    let snapshot = buffer.snapshot();
    assert_eq!(snapshot.len(), 3);

    let records: Vec<(u32, u8)> = snapshot
        .records_rev()
        .map(|(key, value)| (key, value[0]))
        .collect();
    assert_eq!(records, vec![(1, 3), (2, 2), (1, 1)]);

    // Snapshot is a copy; later adds don't show up in it
    buffer.add(4, &[4u8; 8], 0).unwrap();
    assert_eq!(snapshot.len(), 3);
}
