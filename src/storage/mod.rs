//! Storage Module
//!
//! On-disk side of the engine: the database directory, its files, and the
//! scans that read them.
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── meta        4-byte big-endian value size
//!   ├── wal         write-log, whole blocks, append-only
//!   ├── data        compacted records, whole blocks
//!   ├── wal.next    write-log of the generation being built (compaction only)
//!   ├── data.next   data file of the generation being built (compaction only)
//!   └── *.del       superseded files awaiting deletion
//! ```

mod file;
mod meta;
mod scan;

pub use file::{DbPaths, FileHandle};
pub use meta::MetaFile;
pub use scan::{scan_forward, MergeScan, ScanSource};

pub(crate) use file::remove_quietly;
