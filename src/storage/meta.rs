//! Meta file
//!
//! Records the value size a database was created with. Four bytes, a
//! big-endian `u32`, written once and checked on every open.

use std::fs;
use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StormError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Meta {
    value_size: u32,
}

/// Fixed-width big-endian encoding, so `Meta` is exactly 4 bytes on disk
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

/// Reader/writer for the `meta` file
pub struct MetaFile;

impl MetaFile {
    /// Check `value_size` against an existing meta file, or write a new one.
    ///
    /// Returns `true` when the file was created.
    pub fn load_or_create(path: &Path, value_size: usize) -> Result<bool> {
        if path.exists() {
            let stored = Self::read(path)?;
            if stored != value_size {
                return Err(StormError::ValueSizeMismatch {
                    stored,
                    requested: value_size,
                });
            }
            return Ok(false);
        }

        Self::write(path, value_size)?;
        Ok(true)
    }

    pub fn read(path: &Path) -> Result<usize> {
        let bytes = fs::read(path)?;
        let meta: Meta = codec()
            .deserialize(&bytes)
            .map_err(|e| StormError::Serialization(format!("Invalid meta file: {}", e)))?;
        Ok(meta.value_size as usize)
    }

    pub fn write(path: &Path, value_size: usize) -> Result<()> {
        let value_size = u32::try_from(value_size)
            .map_err(|_| StormError::Config(format!("value size {} overflows u32", value_size)))?;
        let bytes = codec()
            .serialize(&Meta { value_size })
            .map_err(|e| StormError::Serialization(e.to_string()))?;
        fs::write(path, bytes)?;
        Ok(())
    }
}
