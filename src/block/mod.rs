//! Block Module
//!
//! Record and block framing shared by the write buffer, the write-log and the
//! data file.
//!
//! ## Responsibilities
//! - Record geometry (`key || value`, fixed size)
//! - Block geometry (128 records + CRC32 trailer)
//! - Record ordinal ↔ byte offset conversion
//! - Key byte translation
//!
//! ## Block Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Record 0                                                 │
//! │ ┌─────────────────┬────────────────────────────────────┐ │
//! │ │ Key (4, BE u32) │ Value (V bytes)                    │ │
//! │ └─────────────────┴────────────────────────────────────┘ │
//! │ ... Record 1 .. Record 127 ...                           │
//! ├──────────────────────────────────────────────────────────┤
//! │ CRC32 (4, BE) over the 128 records' raw bytes            │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A partial block is padded with sync-marker records (key `0xFFFFFFFF`,
//! value all `0xFF`) before its checksum is computed.

mod buffer;

pub use buffer::{BufferSnapshot, WriteBuffer};

use bytes::Buf;

use crate::error::{Result, StormError};

// =============================================================================
// Shared Constants
// =============================================================================

/// Size of an encoded key
pub const KEY_SIZE: usize = 4;

/// Size of the checksum trailer closing every block
pub const CRC_SIZE: usize = 4;

/// Records per block, padding included
pub const RECORDS_PER_BLOCK: usize = 128;

/// Key reserved for sync-marker padding records
pub const RESERVED_KEY: u32 = 0xFFFF_FFFF;

/// Fill byte for the value of a sync-marker record
pub const SYNC_MARKER_FILL: u8 = 0xFF;

/// Largest supported value size
pub const MAX_VALUE_SIZE: usize = 512 * 1024;

/// Target memory budget for write buffers and scan windows
pub const FOUR_MB: usize = 4 * 1024 * 1024;

// =============================================================================
// Block Layout
// =============================================================================

/// Geometry of records and blocks for one value size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    value_size: usize,
    record_size: usize,
    block_size: usize,
}

impl BlockLayout {
    /// Validate a value size and derive the layout for it
    pub fn new(value_size: usize) -> Result<Self> {
        if value_size == 0 {
            return Err(StormError::Config(
                "value size must be at least 1 byte".to_string(),
            ));
        }
        if value_size > MAX_VALUE_SIZE {
            return Err(StormError::ValueSizeTooLarge {
                size: value_size,
                max: MAX_VALUE_SIZE,
            });
        }

        let record_size = value_size + KEY_SIZE;
        Ok(Self {
            value_size,
            record_size,
            block_size: RECORDS_PER_BLOCK * record_size + CRC_SIZE,
        })
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Bytes in one framed block, trailer included
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes covered by a block's checksum
    pub fn records_size(&self) -> usize {
        RECORDS_PER_BLOCK * self.record_size
    }

    /// Byte offset of the record slot with the given ordinal
    pub fn offset_of(&self, ordinal: u64) -> u64 {
        let per_block = RECORDS_PER_BLOCK as u64;
        (ordinal / per_block) * self.block_size as u64
            + (ordinal % per_block) * self.record_size as u64
    }

    /// Ordinal of the record slot starting at `offset`.
    ///
    /// `offset` must point at a record boundary.
    pub fn ordinal_at(&self, offset: u64) -> u64 {
        let block = offset / self.block_size as u64;
        let within = offset % self.block_size as u64;
        block * RECORDS_PER_BLOCK as u64 + within / self.record_size as u64
    }

    /// Whether `len` is a whole number of blocks
    pub fn is_aligned(&self, len: u64) -> bool {
        len % self.block_size as u64 == 0
    }

    /// `len` rounded down to a whole number of blocks
    pub fn align_down(&self, len: u64) -> u64 {
        len - len % self.block_size as u64
    }

    /// Blocks read per scan window (roughly 4 MB, at least one block)
    pub fn window_blocks(&self) -> usize {
        (FOUR_MB / self.block_size).max(1)
    }

    /// Whether a framed block's trailer matches its records
    pub fn verify_block(&self, block: &[u8]) -> bool {
        let records_size = self.records_size();
        if block.len() != self.block_size {
            return false;
        }
        let mut trailer = &block[records_size..];
        crc32fast::hash(&block[..records_size]) == trailer.get_u32()
    }

    /// Records of one framed block, in file order, as `(key, value)`
    pub fn records<'a>(
        &self,
        block: &'a [u8],
    ) -> impl DoubleEndedIterator<Item = (u32, &'a [u8])> + 'a {
        block[..self.records_size()]
            .chunks_exact(self.record_size)
            .map(split_record)
    }
}

/// Split a raw record into its key and value
pub(crate) fn split_record(record: &[u8]) -> (u32, &[u8]) {
    let mut key = &record[..KEY_SIZE];
    (key.get_u32(), &record[KEY_SIZE..])
}

// =============================================================================
// Key Translation
// =============================================================================

/// Decode a 4-byte big-endian key
pub fn key_from_bytes(bytes: &[u8]) -> Result<u32> {
    if bytes.len() != KEY_SIZE {
        return Err(StormError::InvalidKeyLength(bytes.len()));
    }
    let mut buf = bytes;
    Ok(buf.get_u32())
}

/// Encode a key as 4 big-endian bytes
pub fn key_to_bytes(key: u32) -> [u8; KEY_SIZE] {
    key.to_be_bytes()
}
