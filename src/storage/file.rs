//! Database files
//!
//! Directory layout and shared file handles with positional reads.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::block::FOUR_MB;
use crate::error::Result;

// =============================================================================
// Directory Layout
// =============================================================================

const META_FILENAME: &str = "meta";
const DATA_FILENAME: &str = "data";
const WAL_FILENAME: &str = "wal";
const NEXT_SUFFIX: &str = ".next";
const DELETE_SUFFIX: &str = ".del";

/// Paths of every file a database directory may contain
#[derive(Debug, Clone)]
pub struct DbPaths {
    dir: PathBuf,
}

impl DbPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> PathBuf {
        self.dir.join(META_FILENAME)
    }

    pub fn data(&self) -> PathBuf {
        self.dir.join(DATA_FILENAME)
    }

    pub fn wal(&self) -> PathBuf {
        self.dir.join(WAL_FILENAME)
    }

    pub fn next_data(&self) -> PathBuf {
        self.dir.join(format!("{DATA_FILENAME}{NEXT_SUFFIX}"))
    }

    pub fn next_wal(&self) -> PathBuf {
        self.dir.join(format!("{WAL_FILENAME}{NEXT_SUFFIX}"))
    }

    pub fn deleted_data(&self) -> PathBuf {
        self.dir.join(format!("{DATA_FILENAME}{DELETE_SUFFIX}"))
    }

    pub fn deleted_wal(&self) -> PathBuf {
        self.dir.join(format!("{WAL_FILENAME}{DELETE_SUFFIX}"))
    }
}

// =============================================================================
// File Handle
// =============================================================================

/// An open database file shared between threads.
///
/// Reads are positional, so concurrent readers never race on a cursor.
/// Writes always append. The handle stays valid across renames; `path` is
/// the name the file was opened under.
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    file: File,
}

impl FileHandle {
    /// Open (creating if missing) a file for reads and appends
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Create an empty file (truncating any previous content)
    pub fn create(path: &Path) -> Result<Self> {
        File::create(path)?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Fill `buf` from `offset`; a short file yields `UnexpectedEof`
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    /// Append bytes at the end of the file
    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        (&self.file).write_all(bytes)
    }

    /// Cut the file down to `len` bytes
    pub fn truncate(&self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    /// fsync file contents
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Append the first `len` bytes of `src` to this file
    pub fn append_from(&self, src: &FileHandle, len: u64) -> Result<()> {
        let mut window = vec![0u8; FOUR_MB.min(len as usize)];
        let mut copied = 0u64;
        while copied < len {
            let n = window.len().min((len - copied) as usize);
            src.read_exact_at(&mut window[..n], copied)?;
            self.append(&window[..n])?;
            copied += n as u64;
        }
        Ok(())
    }
}

impl Write for &FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&self.file).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&self.file).flush()
    }
}

/// Remove a file if it exists, logging instead of failing
pub(crate) fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unable to delete file");
        }
    }
}
