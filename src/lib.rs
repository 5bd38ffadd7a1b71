//! # stormkv
//!
//! An embedded key-value store for fixed-size values:
//! - 4-byte integer keys, values of a length fixed at creation
//! - Block-framed write-ahead log with CRC32 checksums
//! - Online compaction into an immutable data file
//! - Crash recovery of interrupted compactions
//! - Many concurrent readers, serialized writers
//!
//! Unix only: readers share file handles through positional reads (`pread`).
//!
//! ## Architecture Overview
//!
//! ```text
//!          put                      get / iterate
//!           │                             │
//! ┌─────────▼─────────────────────────────▼─────────────────────┐
//! │          RwLock<EngineState>  (index + routing bitsets)     │
//! └─────────┬─────────────────────────────┬─────────────────────┘
//!           │                             │
//!           ▼                             ▼
//!   ┌──────────────┐  flush   ┌──────────────────┐
//!   │ Write Buffer │ ───────▶ │  wal (blocks)    │──┐
//!   │  (4 MB)      │          └──────────────────┘  │ compact
//!   └──────────────┘          ┌──────────────────┐  │
//!                             │  data (blocks)   │◀─┘
//!                             └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use stormkv::{Config, Engine};
//!
//! # fn main() -> stormkv::Result<()> {
//! let config = Config::builder().data_dir("/tmp/counters").value_size(8).build();
//! let engine = Engine::open(config)?;
//!
//! engine.put(42, &7u64.to_be_bytes())?;
//! assert_eq!(engine.get(42)?, Some(7u64.to_be_bytes().to_vec()));
//!
//! engine.compact()?;
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

#[cfg(not(unix))]
compile_error!("stormkv needs positional file reads and builds on unix targets only");

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod block;
pub mod index;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StormError, Result};
pub use config::{Config, WalSyncStrategy};
pub use engine::{CompactionOutcome, CompactionStats, Engine};
pub use block::{key_from_bytes, key_to_bytes, RESERVED_KEY};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of stormkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
