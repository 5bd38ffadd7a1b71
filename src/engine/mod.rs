//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Coordinate write buffer, index, routing bitsets and files
//! - Handle concurrent read/write access
//! - Flush the write buffer to the write-log when it fills
//! - Compact the write-log into the data file on request
//! - Recover interrupted compactions and rebuild the index on startup

mod compaction;
mod read;
mod recovery;
mod state;
mod write;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::block::{BlockLayout, WriteBuffer};
use crate::config::Config;
use crate::error::Result;
use crate::storage::{DbPaths, FileHandle, MetaFile};

pub use compaction::{CompactionOutcome, CompactionStats};

use state::{EngineState, Phase};

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **State** (index, bitsets, buffer, file handles): one `RwLock`
///   - `put`/`flush` hold the write lock for the whole mutation
///   - `get`/`iterate` hold the read lock only to snapshot what they need,
///     then do file I/O without it
///
/// - **Compaction**: serialized by `compaction_lock`
///   - Seal and Promote take the state write lock briefly
///   - Merge runs unlocked; each batch of index updates takes the write lock
///
/// - **Files**: one shared handle per file, read positionally, so readers
///   never fight over a cursor
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Record/block geometry for the configured value size
    layout: BlockLayout,

    /// Paths inside the data directory
    paths: DbPaths,

    /// Index, routing, buffer and generation state
    state: RwLock<EngineState>,

    /// Serializes compaction runs
    compaction_lock: Mutex<()>,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the value size and create the data directory
    /// 2. Create or check the meta file
    /// 3. Repair files left by an interrupted compaction
    /// 4. Trim a torn write-log tail
    /// 5. Rebuild the index from the data file and the write-log
    /// 6. Finish the interrupted compaction, if there was one
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Reject bad value sizes before touching the disk
        let layout = BlockLayout::new(config.value_size)?;
        fs::create_dir_all(&config.data_dir)?;
        let paths = DbPaths::new(&config.data_dir);

        // Step 2: Meta file pins the value size for the directory's lifetime
        let created = MetaFile::load_or_create(&paths.meta(), config.value_size)?;

        // Step 3: Converge half-finished compactions
        let needs_compaction = if created {
            false
        } else {
            recovery::repair_files(&paths, &layout)?
        };

        // Step 4: Open files, dropping any partial block at the end of the log
        let wal = Arc::new(FileHandle::open(&paths.wal())?);
        let data = Arc::new(FileHandle::open(&paths.data())?);
        let wal_bytes = recovery::trim_torn_tail(&wal, &layout)?;
        let data_bytes = data.len()?;

        // Step 5: Index + write-log bitset
        let (index, in_write_log) = recovery::build_index(
            &layout,
            config.verify_checksums,
            (&data, data_bytes),
            (&wal, wal_bytes),
        )?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            value_size = config.value_size,
            keys = index.len(),
            wal_bytes,
            data_bytes,
            created,
            "Opened database"
        );

        let engine = Self {
            layout,
            paths,
            state: RwLock::new(EngineState {
                index,
                in_write_log,
                buffer: WriteBuffer::with_layout(layout),
                wal,
                data,
                wal_bytes,
                data_bytes,
                phase: Phase::Stable,
            }),
            compaction_lock: Mutex::new(()),
            config,
        };

        // Step 6: Writes accepted during the interrupted compaction are now in
        // the write-log; compact again to reach the state it would have left
        if needs_compaction {
            tracing::info!("Re-running interrupted compaction");
            engine.compact()?;
        }

        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified value size and data directory
    pub fn open_path(value_size: usize, path: &Path) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path)
            .value_size(value_size)
            .build();
        Self::open(config)
    }

    /// Close the engine gracefully
    ///
    /// Flushes any pending records and syncs the write-log
    pub fn close(self) -> Result<()> {
        let mut state = self.state.write();
        state.flush_buffer(self.config.wal_sync_strategy)?;
        state.active_wal().sync()?;
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fixed value size in bytes
    pub fn value_size(&self) -> usize {
        self.layout.value_size()
    }

    /// Record/block geometry
    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().index.is_empty()
    }

    /// Durable bytes in the active write-log
    pub fn wal_bytes(&self) -> u64 {
        self.state.read().wal_bytes
    }

    /// Bytes in the current data file
    pub fn data_bytes(&self) -> u64 {
        self.state.read().data_bytes
    }

    /// Records waiting in the write buffer
    pub fn buffered_records(&self) -> usize {
        self.state.read().buffer.len()
    }

    /// Whether a compaction currently has a next generation open
    pub fn is_compacting(&self) -> bool {
        self.state.read().is_compacting()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let mut state = self.state.write();
        if let Err(e) = state.flush_buffer(self.config.wal_sync_strategy) {
            tracing::error!(error = %e, "Failed to flush write buffer on drop");
        }
    }
}
