//! File scans
//!
//! Backward merge scan used by iteration and compaction, and the forward
//! scan used to rebuild the index on open.
//!
//! ## Merge order
//! ```text
//!   newest ─────────────────────────────────────────────▶ oldest
//!   [write buffer] [next write-log] [write-log] [data file]
//!        ◀── each source is read back-to-front, in ~4 MB windows
//! ```
//! A key is delivered on its first (newest) encounter only.

use std::sync::Arc;

use roaring::RoaringBitmap;

use crate::block::{BlockLayout, BufferSnapshot, RECORDS_PER_BLOCK, RESERVED_KEY};
use crate::error::{Result, StormError};

use super::FileHandle;

/// A file to scan and the length to treat as its end
#[derive(Debug, Clone)]
pub struct ScanSource {
    pub handle: Arc<FileHandle>,
    pub len: u64,
}

/// Deduplicating, newest-first scan over a buffer snapshot and files
pub struct MergeScan {
    layout: BlockLayout,
    verify_checksums: bool,
    buffer: Option<BufferSnapshot>,
    sources: Vec<ScanSource>,
}

impl MergeScan {
    pub fn new(layout: BlockLayout, verify_checksums: bool) -> Self {
        Self {
            layout,
            verify_checksums,
            buffer: None,
            sources: Vec::with_capacity(3),
        }
    }

    /// Scan pending buffer records before any file
    pub fn with_buffer(mut self, snapshot: BufferSnapshot) -> Self {
        self.buffer = Some(snapshot);
        self
    }

    /// Add a file; sources are scanned in the order they are pushed
    pub fn push_source(&mut self, handle: Arc<FileHandle>, len: u64) {
        self.sources.push(ScanSource { handle, len });
    }

    /// Deliver each live key once, with its newest value.
    ///
    /// Returns the number of records delivered. A consumer error stops the
    /// scan and is returned as is.
    pub fn run<F>(self, mut consumer: F) -> Result<u64>
    where
        F: FnMut(u32, &[u8]) -> Result<()>,
    {
        let mut seen = RoaringBitmap::new();
        let mut delivered = 0u64;

        if let Some(snapshot) = &self.buffer {
            for (key, value) in snapshot.records_rev() {
                if key != RESERVED_KEY && seen.insert(key) {
                    consumer(key, value)?;
                    delivered += 1;
                }
            }
        }

        for source in &self.sources {
            delivered += self.scan_backward(source, &mut seen, &mut consumer)?;
        }

        Ok(delivered)
    }

    fn scan_backward<F>(
        &self,
        source: &ScanSource,
        seen: &mut RoaringBitmap,
        consumer: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(u32, &[u8]) -> Result<()>,
    {
        check_aligned(&self.layout, source)?;

        let block_size = self.layout.block_size() as u64;
        let window_size = self.layout.window_blocks() as u64 * block_size;
        let mut window = vec![0u8; window_size.min(source.len) as usize];
        let mut delivered = 0u64;

        let mut end = source.len;
        while end > 0 {
            let start = end.saturating_sub(window_size);
            let chunk = &mut window[..(end - start) as usize];
            source.handle.read_exact_at(chunk, start)?;

            let first_block = start / block_size;
            for (i, block) in chunk.chunks_exact(block_size as usize).enumerate().rev() {
                if self.verify_checksums && !self.layout.verify_block(block) {
                    return Err(checksum_error(source, first_block + i as u64));
                }
                for (key, value) in self.layout.records(block).rev() {
                    if key != RESERVED_KEY && seen.insert(key) {
                        consumer(key, value)?;
                        delivered += 1;
                    }
                }
            }

            end = start;
        }

        Ok(delivered)
    }
}

/// Visit every record of a file front to back as `(ordinal, key)`.
///
/// Sync-marker records are skipped but still occupy their ordinal.
pub fn scan_forward<F>(
    layout: &BlockLayout,
    source: &ScanSource,
    verify_checksums: bool,
    mut visit: F,
) -> Result<u64>
where
    F: FnMut(u64, u32),
{
    check_aligned(layout, source)?;

    let block_size = layout.block_size() as u64;
    let window_size = layout.window_blocks() as u64 * block_size;
    let mut window = vec![0u8; window_size.min(source.len) as usize];
    let mut visited = 0u64;

    let mut start = 0u64;
    while start < source.len {
        let end = (start + window_size).min(source.len);
        let chunk = &mut window[..(end - start) as usize];
        source.handle.read_exact_at(chunk, start)?;

        let first_block = start / block_size;
        for (i, block) in chunk.chunks_exact(block_size as usize).enumerate() {
            let block_index = first_block + i as u64;
            if verify_checksums && !layout.verify_block(block) {
                return Err(checksum_error(source, block_index));
            }
            let base = block_index * RECORDS_PER_BLOCK as u64;
            for (slot, (key, _)) in layout.records(block).enumerate() {
                if key != RESERVED_KEY {
                    visit(base + slot as u64, key);
                    visited += 1;
                }
            }
        }

        start = end;
    }

    Ok(visited)
}

fn check_aligned(layout: &BlockLayout, source: &ScanSource) -> Result<()> {
    if layout.is_aligned(source.len) {
        return Ok(());
    }
    Err(StormError::Corruption(format!(
        "{} is {} bytes, not a whole number of {}-byte blocks",
        source.handle.path().display(),
        source.len,
        layout.block_size()
    )))
}

fn checksum_error(source: &ScanSource, block: u64) -> StormError {
    StormError::Corruption(format!(
        "checksum mismatch in {} at block {}",
        source.handle.path().display(),
        block
    ))
}
