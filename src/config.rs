//! Configuration for stormkv
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

/// Main configuration for a stormkv instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all database files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── meta           (configured value size)
    ///     ├── wal            (write-ahead log)
    ///     ├── data           (compacted records)
    ///     └── *.next, *.del  (transient, compaction only)
    pub data_dir: PathBuf,

    /// Fixed length of every value, in bytes. Validated against `meta` on open.
    pub value_size: usize,

    /// Verify block checksums while scanning files (open, iterate, compact)
    pub verify_checksums: bool,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: when to fsync the write-log
    pub wal_sync_strategy: WalSyncStrategy,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Write-log size (in bytes) at which `Engine::should_compact` says yes
    pub compaction_wal_threshold: u64,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalSyncStrategy {
    /// fsync after every write buffer flush
    EveryFlush,

    /// Leave write-back to the operating system
    OsManaged,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./stormkv_data"),
            value_size: 8,
            verify_checksums: true,
            wal_sync_strategy: WalSyncStrategy::EveryFlush,
            compaction_wal_threshold: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the fixed value size (in bytes)
    pub fn value_size(mut self, size: usize) -> Self {
        self.config.value_size = size;
        self
    }

    /// Enable or disable block checksum verification on scans
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.verify_checksums = verify;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the write-log size (in bytes) that makes compaction advisable
    pub fn compaction_wal_threshold(mut self, bytes: u64) -> Self {
        self.config.compaction_wal_threshold = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
