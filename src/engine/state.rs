//! Engine state
//!
//! Everything guarded by the engine's read/write lock: index, routing
//! bitsets, write buffer, and the file generation(s).

use std::sync::Arc;

use roaring::RoaringBitmap;

use crate::block::WriteBuffer;
use crate::config::WalSyncStrategy;
use crate::error::Result;
use crate::index::{resolve, FileRole, Index, NextRouting};
use crate::storage::FileHandle;

/// Lock-protected engine state
pub(crate) struct EngineState {
    pub index: Index,

    /// Keys whose latest record is in the current write-log
    pub in_write_log: RoaringBitmap,

    pub buffer: WriteBuffer,

    /// Current write-log
    pub wal: Arc<FileHandle>,

    /// Current data file
    pub data: Arc<FileHandle>,

    /// Durable bytes in the *active* write-log (the next write-log while
    /// compacting)
    pub wal_bytes: u64,

    /// Bytes in the current data file
    pub data_bytes: u64,

    pub phase: Phase,
}

/// Whether a compaction has a provisional generation open
pub(crate) enum Phase {
    Stable,
    Compacting(NextGeneration),
}

/// Files and routing of the generation being built by a compaction
pub(crate) struct NextGeneration {
    pub wal: Arc<FileHandle>,
    pub data: Arc<FileHandle>,
    pub routing: NextRouting,

    /// Length of the current write-log when it was sealed
    pub sealed_wal_bytes: u64,
}

impl EngineState {
    pub fn next(&self) -> Option<&NextGeneration> {
        match &self.phase {
            Phase::Compacting(next) => Some(next),
            Phase::Stable => None,
        }
    }

    pub fn is_compacting(&self) -> bool {
        matches!(self.phase, Phase::Compacting(_))
    }

    /// Write-log that receives buffer flushes
    pub fn active_wal(&self) -> &Arc<FileHandle> {
        match &self.phase {
            Phase::Compacting(next) => &next.wal,
            Phase::Stable => &self.wal,
        }
    }

    /// Whether `role` names the write-log that buffered records belong to
    pub fn is_active_log(&self, role: FileRole) -> bool {
        match self.phase {
            Phase::Compacting(_) => role == FileRole::NextWriteLog,
            Phase::Stable => role == FileRole::WriteLog,
        }
    }

    /// File currently holding the authoritative record for `key`
    pub fn route(&self, key: u32) -> FileRole {
        resolve(key, &self.in_write_log, self.next().map(|n| &n.routing))
    }

    pub fn handle_for(&self, role: FileRole) -> Option<&Arc<FileHandle>> {
        match role {
            FileRole::NextWriteLog => self.next().map(|n| &n.wal),
            FileRole::NextData => self.next().map(|n| &n.data),
            FileRole::WriteLog => Some(&self.wal),
            FileRole::Data => Some(&self.data),
        }
    }

    /// Record that `key`'s latest value went to the active write-log
    pub fn mark_in_active_log(&mut self, key: u32) {
        match &mut self.phase {
            Phase::Compacting(next) => {
                next.routing.in_write_log.insert(key);
            }
            Phase::Stable => {
                self.in_write_log.insert(key);
            }
        }
    }

    /// Flush the write buffer to the active write-log.
    ///
    /// On a failed write the log is cut back to its last durable length so
    /// it stays block aligned.
    pub fn flush_buffer(&mut self, sync: WalSyncStrategy) -> Result<usize> {
        if !self.buffer.is_dirty() {
            return Ok(0);
        }

        let wal = Arc::clone(self.active_wal());
        let written = match self.buffer.flush(&mut &*wal) {
            Ok(written) => written,
            Err(e) => {
                if let Err(trunc) = wal.truncate(self.wal_bytes) {
                    tracing::warn!(error = %trunc, "Failed to roll back partial write-log flush");
                }
                return Err(e);
            }
        };

        self.wal_bytes += written as u64;
        if sync == WalSyncStrategy::EveryFlush {
            wal.sync()?;
        }

        tracing::debug!(
            bytes = written,
            wal_bytes = self.wal_bytes,
            compacting = self.is_compacting(),
            "Flushed write buffer"
        );

        Ok(written)
    }
}
