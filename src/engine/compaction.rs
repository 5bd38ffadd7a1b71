//! Compaction: rewrites the write-log and data file into a new data file.
//!
//! Runs online in four phases, one compaction at a time:
//!
//! 1. **Seal** (write lock): flush the buffer, open `wal.next` and
//!    `data.next`; new writes go to `wal.next` from here on.
//! 2. **Merge** (no lock): merge-scan the sealed write-log and data file
//!    into `data.next`, publishing each batch to the index under the lock.
//! 3. **Promote** (write lock): rename the next generation into place.
//! 4. **Cleanup** (no lock): delete the superseded files.
//!
//! A failure before Promote's renames is rolled back online: `wal.next` is
//! folded into `wal` and the index rebuilt. If that rebuild fails too, the
//! engine stays on the next generation, keeps serving reads and writes from
//! it, and refuses further compactions until reopened. A failure during the
//! renames is left for recovery on the next open.

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::block::WriteBuffer;
use crate::error::{Result, StormError};
use crate::index::{Address, NextRouting, Role};
use crate::storage::{remove_quietly, FileHandle, MergeScan};

use super::recovery;
use super::state::{EngineState, NextGeneration, Phase};
use super::Engine;

/// What a call to `Engine::compact` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Nothing was written since the last compaction
    Skipped,
    Compacted(CompactionStats),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionStats {
    /// Write-log bytes folded into the new data file
    pub sealed_wal_bytes: u64,
    /// Live records written to the new data file
    pub records_written: u64,
    /// Size of the new data file
    pub data_bytes: u64,
    pub elapsed: Duration,
}

/// Files the Merge phase reads from and writes to
struct SealedGeneration {
    wal: Arc<FileHandle>,
    wal_bytes: u64,
    data: Arc<FileHandle>,
    data_bytes: u64,
    next_data: Arc<FileHandle>,
}

impl Engine {
    /// Compact the write-log into a new data file
    ///
    /// Readers and writers keep running while records are merged; only the
    /// Seal and Promote steps block them briefly.
    pub fn compact(&self) -> Result<CompactionOutcome> {
        let _compaction = self.compaction_lock.lock();
        let started = Instant::now();

        // Step 1: Seal
        let Some(sealed) = self.seal()? else {
            tracing::debug!("Write-log is empty, skipping compaction");
            return Ok(CompactionOutcome::Skipped);
        };
        tracing::info!(
            sealed_wal_bytes = sealed.wal_bytes,
            data_bytes = sealed.data_bytes,
            "Starting compaction"
        );

        // Step 2: Merge
        let (records_written, data_bytes) = match self.merge(&sealed) {
            Ok(merged) => merged,
            Err(e) => return Err(self.abort(e)),
        };

        // Step 3: Promote
        self.promote(data_bytes)?;

        // Step 4: Cleanup
        remove_quietly(&self.paths.deleted_wal());
        remove_quietly(&self.paths.deleted_data());

        let stats = CompactionStats {
            sealed_wal_bytes: sealed.wal_bytes,
            records_written,
            data_bytes,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            records = stats.records_written,
            data_bytes = stats.data_bytes,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Finished compaction"
        );

        Ok(CompactionOutcome::Compacted(stats))
    }

    /// Advisory: whether the write-log has grown enough to compact
    pub fn should_compact(&self) -> bool {
        let state = self.state.read();
        if state.is_compacting() {
            return false;
        }
        let wal_bytes = state.wal_bytes + state.buffer.pending_bytes() as u64;
        wal_bytes >= self.config.compaction_wal_threshold
    }

    // =========================================================================
    // Phases
    // =========================================================================

    fn seal(&self) -> Result<Option<SealedGeneration>> {
        let mut state = self.state.write();

        if state.is_compacting() {
            return Err(StormError::Compaction(
                "an earlier compaction did not finish; reopen the database to recover".to_string(),
            ));
        }

        // Buffered offsets are relative to the durable counter, which is
        // about to reset
        state.flush_buffer(self.config.wal_sync_strategy)?;
        if state.wal_bytes == 0 {
            return Ok(None);
        }
        state.wal.sync()?;

        let next_wal = Arc::new(FileHandle::create(&self.paths.next_wal())?);
        let next_data = match FileHandle::create(&self.paths.next_data()) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                drop(next_wal);
                remove_quietly(&self.paths.next_wal());
                return Err(e);
            }
        };

        let sealed = SealedGeneration {
            wal: Arc::clone(&state.wal),
            wal_bytes: state.wal_bytes,
            data: Arc::clone(&state.data),
            data_bytes: state.data_bytes,
            next_data: Arc::clone(&next_data),
        };

        state.phase = Phase::Compacting(NextGeneration {
            wal: next_wal,
            data: next_data,
            routing: NextRouting::default(),
            sealed_wal_bytes: state.wal_bytes,
        });
        state.wal_bytes = 0;

        Ok(Some(sealed))
    }

    /// Returns `(records_written, data_bytes)` of the new data file
    fn merge(&self, sealed: &SealedGeneration) -> Result<(u64, u64)> {
        let mut staging = WriteBuffer::with_layout(self.layout);
        let mut staged: Vec<(u32, usize)> = Vec::with_capacity(staging.max_records());
        let mut data_bytes = 0u64;

        let mut scan = MergeScan::new(self.layout, self.config.verify_checksums);
        scan.push_source(Arc::clone(&sealed.wal), sealed.wal_bytes);
        scan.push_source(Arc::clone(&sealed.data), sealed.data_bytes);

        let records_written = scan.run(|key, value| {
            if staging.is_full() {
                data_bytes +=
                    self.publish_staged(&mut staging, &mut staged, &sealed.next_data, data_bytes)?;
            }
            let offset = staging.add(key, value, 0)?;
            staged.push((key, offset));
            Ok(())
        })?;
        data_bytes += self.publish_staged(&mut staging, &mut staged, &sealed.next_data, data_bytes)?;

        sealed.next_data.sync()?;
        Ok((records_written, data_bytes))
    }

    /// Write the staging buffer to `data.next`, then repoint its keys.
    ///
    /// Keys rewritten since the seal live in `wal.next` and keep their newer
    /// address.
    fn publish_staged(
        &self,
        staging: &mut WriteBuffer,
        staged: &mut Vec<(u32, usize)>,
        next_data: &FileHandle,
        base: u64,
    ) -> Result<u64> {
        let written = staging.flush(&mut &*next_data)? as u64;
        if written == 0 {
            return Ok(0);
        }

        let mut state = self.state.write();
        let EngineState { index, phase, .. } = &mut *state;
        let Phase::Compacting(next) = phase else {
            return Err(StormError::Compaction(
                "next generation vanished during merge".to_string(),
            ));
        };

        for (key, offset) in staged.drain(..) {
            if next.routing.in_write_log.contains(key) {
                continue;
            }
            let ordinal = self.layout.ordinal_at(base + offset as u64);
            index.insert(key, Address::encode(ordinal, Role::Data));
            next.routing.in_data.insert(key);
        }

        Ok(written)
    }

    fn promote(&self, data_bytes: u64) -> Result<()> {
        let mut state = self.state.write();
        if !state.is_compacting() {
            return Err(StormError::Compaction(
                "no compaction in progress to promote".to_string(),
            ));
        }

        // Nothing has moved yet if the first rename fails
        if let Err(e) = fs::rename(self.paths.wal(), self.paths.deleted_wal()) {
            drop(state);
            return Err(self.abort(e.into()));
        }
        fs::rename(self.paths.data(), self.paths.deleted_data())?;
        fs::rename(self.paths.next_wal(), self.paths.wal())?;
        fs::rename(self.paths.next_data(), self.paths.data())?;

        if let Phase::Compacting(next) = std::mem::replace(&mut state.phase, Phase::Stable) {
            // Keys in `next.routing.in_data` now simply resolve to the data file
            state.in_write_log = next.routing.in_write_log;
            state.wal = next.wal;
            state.data = next.data;
            state.data_bytes = data_bytes;
        }

        Ok(())
    }

    // =========================================================================
    // Abort
    // =========================================================================

    /// Roll a failed compaction back, returning the error that caused it
    fn abort(&self, cause: StormError) -> StormError {
        tracing::warn!(error = %cause, "Compaction failed, rolling back");
        if let Err(e) = self.rollback() {
            tracing::error!(
                error = %e,
                "Compaction rollback failed; the database recovers on next open"
            );
        }
        cause
    }

    /// Fold `wal.next` back into `wal`, rebuild the index from disk, then drop
    /// the next generation.
    ///
    /// Nothing in memory changes until the rebuilt index is in hand. On
    /// failure the write-log is cut back to its sealed length and the engine
    /// keeps writing to `wal.next`; the next open folds it in.
    fn rollback(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.is_compacting() {
            return Ok(());
        }

        state.flush_buffer(self.config.wal_sync_strategy)?;

        let Some(next) = state.next() else {
            return Ok(());
        };
        let sealed_bytes = next.sealed_wal_bytes;
        let next_wal = Arc::clone(&next.wal);
        let pending_bytes = state.wal_bytes;
        let wal = Arc::clone(&state.wal);
        let data = Arc::clone(&state.data);
        let data_bytes = state.data_bytes;

        let rebuilt = wal
            .append_from(&next_wal, pending_bytes)
            .and_then(|()| wal.sync())
            .and_then(|()| {
                let wal_bytes = sealed_bytes + pending_bytes;
                let (index, in_write_log) = recovery::build_index(
                    &self.layout,
                    self.config.verify_checksums,
                    (&data, data_bytes),
                    (&wal, wal_bytes),
                )?;
                Ok((index, in_write_log, wal_bytes))
            });

        let (index, in_write_log, wal_bytes) = match rebuilt {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                if let Err(trunc) = wal.truncate(sealed_bytes) {
                    tracing::warn!(error = %trunc, "Failed to cut write-log back to its sealed length");
                }
                return Err(e);
            }
        };

        state.phase = Phase::Stable;
        state.index = index;
        state.in_write_log = in_write_log;
        state.wal_bytes = wal_bytes;

        drop(next_wal);
        remove_quietly(&self.paths.next_wal());
        remove_quietly(&self.paths.next_data());

        tracing::info!(wal_bytes, keys = state.index.len(), "Compaction rolled back");
        Ok(())
    }
}
