//! Write Buffer
//!
//! In-memory staging area that frames records into blocks before they reach
//! the write-log (or, during compaction, the next data file).

use std::io::Write;

use bytes::BufMut;

use crate::error::{Result, StormError};

use super::{
    split_record, BlockLayout, FOUR_MB, RECORDS_PER_BLOCK, RESERVED_KEY, SYNC_MARKER_FILL,
};

/// Fixed-capacity buffer of framed blocks.
///
/// Capacity is a whole number of blocks: as many as fit 4 MB of records for
/// small values, and a single block once one block alone exceeds that.
/// Every completed block gets its CRC32 trailer as soon as its 128th record
/// lands; the last partial block is padded and closed by `flush`.
pub struct WriteBuffer {
    layout: BlockLayout,
    /// Backing storage, `capacity()` bytes
    buf: Vec<u8>,
    /// Records (padding included) added since the last flush
    records: usize,
    /// Records that fit before the buffer is full
    max_records: usize,
}

impl WriteBuffer {
    /// Create a buffer for values of `value_size` bytes.
    ///
    /// Fails with `ValueSizeTooLarge` above the supported maximum.
    pub fn new(value_size: usize) -> Result<Self> {
        Ok(Self::with_layout(BlockLayout::new(value_size)?))
    }

    /// Create a buffer for an already validated layout
    pub fn with_layout(layout: BlockLayout) -> Self {
        let records_fitting = FOUR_MB / layout.record_size();
        let blocks = (records_fitting / RECORDS_PER_BLOCK).max(1);

        Self {
            layout,
            buf: vec![0u8; blocks * layout.block_size()],
            records: 0,
            max_records: blocks * RECORDS_PER_BLOCK,
        }
    }

    /// Append one record, returning its byte offset within the buffer.
    ///
    /// Copies `value_size` bytes of `value` starting at `offset`. Fails with
    /// `BufferFull` instead of overwriting; callers check `is_full` first.
    pub fn add(&mut self, key: u32, value: &[u8], offset: usize) -> Result<usize> {
        if self.is_full() {
            return Err(StormError::BufferFull);
        }

        let value_size = self.layout.value_size();
        let value = offset
            .checked_add(value_size)
            .and_then(|end| value.get(offset..end))
            .ok_or(StormError::InvalidValueLength {
                expected: value_size,
                actual: value.len().saturating_sub(offset),
            })?;

        Ok(self.push_record(key, Some(value)))
    }

    /// True when no further record fits
    pub fn is_full(&self) -> bool {
        self.records >= self.max_records
    }

    /// True when records were added since the last flush
    pub fn is_dirty(&self) -> bool {
        self.records > 0
    }

    /// Write every pending block to `sink`, padding the last one.
    ///
    /// Returns the number of bytes written: 0 when the buffer is clean,
    /// otherwise a whole multiple of the block size.
    pub fn flush<W: Write>(&mut self, sink: &mut W) -> Result<usize> {
        if !self.is_dirty() {
            return Ok(0);
        }

        while self.records % RECORDS_PER_BLOCK != 0 {
            self.push_record(RESERVED_KEY, None);
        }

        let len = (self.records / RECORDS_PER_BLOCK) * self.layout.block_size();
        sink.write_all(&self.buf[..len])?;

        self.records = 0;
        Ok(len)
    }

    /// Raw backing storage, for reads of not-yet-flushed records
    pub fn array(&self) -> &[u8] {
        &self.buf
    }

    /// Number of `add` calls from empty until `is_full`
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Size of the backing storage in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Records added since the last flush
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Bytes the pending records will occupy once flushed
    pub fn pending_bytes(&self) -> usize {
        self.records.div_ceil(RECORDS_PER_BLOCK) * self.layout.block_size()
    }

    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// The record written at `offset`, if it has been written since the last
    /// flush
    pub fn record_at(&self, offset: usize) -> Option<(u32, &[u8])> {
        let written = self.layout.offset_of(self.records as u64) as usize;
        let end = offset.checked_add(self.layout.record_size())?;
        if end > written {
            return None;
        }
        Some(split_record(&self.buf[offset..end]))
    }

    /// Copy of the pending records, for iteration outside the lock
    pub fn snapshot(&self) -> BufferSnapshot {
        let written = self.layout.offset_of(self.records as u64) as usize;
        BufferSnapshot {
            layout: self.layout,
            bytes: self.buf[..written].to_vec(),
            records: self.records,
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write a record at the cursor; `None` writes sync-marker fill
    fn push_record(&mut self, key: u32, value: Option<&[u8]>) -> usize {
        let record_size = self.layout.record_size();
        let position = self.layout.offset_of(self.records as u64) as usize;

        let mut slot = &mut self.buf[position..position + record_size];
        slot.put_u32(key);
        match value {
            Some(v) => slot.put_slice(v),
            None => slot.put_bytes(SYNC_MARKER_FILL, self.layout.value_size()),
        }

        self.records += 1;
        if self.records % RECORDS_PER_BLOCK == 0 {
            self.close_block(self.records / RECORDS_PER_BLOCK - 1);
        }

        position
    }

    /// Write the CRC32 trailer of a completed block
    fn close_block(&mut self, block: usize) {
        let start = block * self.layout.block_size();
        let records_end = start + self.layout.records_size();

        let crc = crc32fast::hash(&self.buf[start..records_end]);
        let mut trailer = &mut self.buf[records_end..start + self.layout.block_size()];
        trailer.put_u32(crc);
    }
}

/// Pending records copied out of a write buffer
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    layout: BlockLayout,
    bytes: Vec<u8>,
    records: usize,
}

impl BufferSnapshot {
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Records newest first, sync markers included
    pub fn records_rev(&self) -> impl Iterator<Item = (u32, &[u8])> + '_ {
        let record_size = self.layout.record_size();
        (0..self.records as u64).rev().map(move |ordinal| {
            let start = self.layout.offset_of(ordinal) as usize;
            split_record(&self.bytes[start..start + record_size])
        })
    }
}
