//! Routing bitsets
//!
//! Per-key sets recording which physical file holds a key's authoritative
//! record, independent of the address stored in the index.

use roaring::RoaringBitmap;

use super::Role;

/// Physical file a key resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    NextWriteLog,
    NextData,
    WriteLog,
    Data,
}

impl FileRole {
    /// Address role used to decode positions in this file
    pub fn address_role(self) -> Role {
        match self {
            FileRole::NextWriteLog | FileRole::WriteLog => Role::WriteLog,
            FileRole::NextData | FileRole::Data => Role::Data,
        }
    }
}

/// Bitsets of the provisional generation, alive only while compacting
#[derive(Debug, Default)]
pub struct NextRouting {
    pub in_write_log: RoaringBitmap,
    pub in_data: RoaringBitmap,
}

/// Resolve a key's file: next write-log, then next data, then write-log,
/// else the stable data file.
pub fn resolve(key: u32, in_write_log: &RoaringBitmap, next: Option<&NextRouting>) -> FileRole {
    if let Some(next) = next {
        if next.in_write_log.contains(key) {
            return FileRole::NextWriteLog;
        }
        if next.in_data.contains(key) {
            return FileRole::NextData;
        }
    }
    if in_write_log.contains(key) {
        FileRole::WriteLog
    } else {
        FileRole::Data
    }
}
