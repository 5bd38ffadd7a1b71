//! Startup recovery
//!
//! Converges files left behind by an interrupted compaction, trims torn
//! write-log tails, and rebuilds the index.
//!
//! Promote renames in this order, so each crash point is recognizable by
//! which files exist:
//!
//! ```text
//! 1. wal       → wal.del
//! 2. data      → data.del
//! 3. wal.next  → wal
//! 4. data.next → data
//! ```

use std::fs;
use std::sync::Arc;

use roaring::RoaringBitmap;

use crate::block::BlockLayout;
use crate::error::Result;
use crate::index::{Address, Index, Role};
use crate::storage::{remove_quietly, scan_forward, DbPaths, FileHandle, ScanSource};

/// Bring the directory back to a single generation.
///
/// Returns `true` when the interrupted compaction has to run again.
pub(super) fn repair_files(paths: &DbPaths, layout: &BlockLayout) -> Result<bool> {
    let next_data = paths.next_data().exists();
    let next_wal = paths.next_wal().exists();
    let wal_del = paths.deleted_wal().exists();

    let mut needs_compaction = false;

    if next_data && !next_wal && wal_del {
        // Crashed after step 3: the merge had finished, complete the promote
        tracing::warn!("Completing interrupted compaction promote");
        if paths.data().exists() {
            fs::rename(paths.data(), paths.deleted_data())?;
        }
        fs::rename(paths.next_data(), paths.data())?;
    } else if next_data || next_wal {
        // Crashed before step 3: fall back to the previous generation and
        // keep every write accepted since the seal
        tracing::warn!(next_data, next_wal, "Recovering interrupted compaction");

        if !paths.wal().exists() && wal_del {
            fs::rename(paths.deleted_wal(), paths.wal())?;
        }
        if !paths.data().exists() && paths.deleted_data().exists() {
            fs::rename(paths.deleted_data(), paths.data())?;
        }

        if next_wal {
            let wal = FileHandle::open(&paths.wal())?;
            // A crash during an earlier recovery may have left part of an
            // append behind; whole blocks are harmless duplicates
            trim_torn_tail(&wal, layout)?;

            let pending = FileHandle::open(&paths.next_wal())?;
            let pending_bytes = pending.len()?;
            wal.append_from(&pending, pending_bytes)?;
            wal.sync()?;
            tracing::info!(bytes = pending_bytes, "Appended next write-log to write-log");

            drop(pending);
            fs::remove_file(paths.next_wal())?;
        }
        if next_data {
            fs::remove_file(paths.next_data())?;
        }

        needs_compaction = true;
    }

    remove_quietly(&paths.deleted_wal());
    remove_quietly(&paths.deleted_data());

    Ok(needs_compaction)
}

/// Cut a write-log back to a whole number of blocks, returning its length
pub(super) fn trim_torn_tail(wal: &FileHandle, layout: &BlockLayout) -> Result<u64> {
    let len = wal.len()?;
    if layout.is_aligned(len) {
        return Ok(len);
    }

    let aligned = layout.align_down(len);
    tracing::warn!(
        path = %wal.path().display(),
        len,
        truncated_to = aligned,
        "Write-log ends in a partial block, truncating"
    );
    wal.truncate(aligned)?;
    Ok(aligned)
}

/// Rebuild the index from the data file, then the write-log.
///
/// Write-log records are scanned last so they shadow older data records.
pub(super) fn build_index(
    layout: &BlockLayout,
    verify_checksums: bool,
    data: (&Arc<FileHandle>, u64),
    wal: (&Arc<FileHandle>, u64),
) -> Result<(Index, RoaringBitmap)> {
    let mut index = Index::new();
    let mut in_write_log = RoaringBitmap::new();

    let data_source = ScanSource {
        handle: Arc::clone(data.0),
        len: data.1,
    };
    let data_records = scan_forward(layout, &data_source, verify_checksums, |ordinal, key| {
        index.insert(key, Address::encode(ordinal, Role::Data));
    })?;

    let wal_source = ScanSource {
        handle: Arc::clone(wal.0),
        len: wal.1,
    };
    let wal_records = scan_forward(layout, &wal_source, verify_checksums, |ordinal, key| {
        index.insert(key, Address::encode(ordinal, Role::WriteLog));
        in_write_log.insert(key);
    })?;

    tracing::debug!(data_records, wal_records, keys = index.len(), "Built index");

    Ok((index, in_write_log))
}
