//! Read path: point lookups and full scans.

use std::io;
use std::sync::Arc;

use crate::block::{key_from_bytes, KEY_SIZE};
use crate::error::{Result, StormError};
use crate::storage::{FileHandle, MergeScan};

use super::{Engine, Phase};

impl Engine {
    /// Get the value stored under `key`
    ///
    /// Lookup order:
    /// 1. Index (miss → `None`)
    /// 2. Routing bitsets pick the file: next write-log, next data,
    ///    write-log, data
    /// 3. Records not yet flushed are copied straight from the write buffer
    /// 4. Otherwise the file is read after the lock is released
    pub fn get(&self, key: u32) -> Result<Option<Vec<u8>>> {
        let (handle, offset) = {
            let state = self.state.read();

            let Some(address) = state.index.get(key) else {
                return Ok(None);
            };

            let role = state.route(key);
            let position = address.decode(role.address_role()).ok_or_else(|| {
                StormError::Corruption(format!(
                    "key {} is routed to {:?} but indexed as {:?}",
                    key,
                    role,
                    address.role()
                ))
            })?;
            let offset = self.layout.offset_of(position);

            if state.is_active_log(role) && offset >= state.wal_bytes {
                let buffer_offset = (offset - state.wal_bytes) as usize;
                let (found, value) = state.buffer.record_at(buffer_offset).ok_or_else(|| {
                    StormError::Corruption(format!(
                        "key {} points past the end of the write buffer",
                        key
                    ))
                })?;
                if found != key {
                    return Err(StormError::InconsistentData {
                        expected: key,
                        found,
                    });
                }
                return Ok(Some(value.to_vec()));
            }

            let handle = state.handle_for(role).ok_or_else(|| {
                StormError::Corruption(format!("key {} is routed to a missing {:?}", key, role))
            })?;
            (Arc::clone(handle), offset)
        };

        // No lock held from here on
        let mut key_bytes = [0u8; KEY_SIZE];
        read_record_part(&handle, &mut key_bytes, offset)?;
        let found = key_from_bytes(&key_bytes)?;
        if found != key {
            return Err(StormError::InconsistentData {
                expected: key,
                found,
            });
        }

        let mut value = vec![0u8; self.layout.value_size()];
        read_record_part(&handle, &mut value, offset + KEY_SIZE as u64)?;
        Ok(Some(value))
    }

    /// Get the value stored under a 4-byte big-endian key
    pub fn get_bytes(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get(key_from_bytes(key)?)
    }

    /// Visit every live key once, with its latest value, in scan order
    pub fn iterate<F>(&self, mut consumer: F) -> Result<()>
    where
        F: FnMut(u32, &[u8]),
    {
        self.try_iterate(|key, value| {
            consumer(key, value);
            Ok(())
        })
    }

    /// Like `iterate`, but the consumer may stop the scan with an error
    pub fn try_iterate<F>(&self, consumer: F) -> Result<()>
    where
        F: FnMut(u32, &[u8]) -> Result<()>,
    {
        let scan = {
            let state = self.state.read();

            let mut scan = MergeScan::new(self.layout, self.config.verify_checksums)
                .with_buffer(state.buffer.snapshot());
            match &state.phase {
                Phase::Compacting(next) => {
                    scan.push_source(Arc::clone(&next.wal), state.wal_bytes);
                    scan.push_source(Arc::clone(&state.wal), next.sealed_wal_bytes);
                }
                Phase::Stable => {
                    scan.push_source(Arc::clone(&state.wal), state.wal_bytes);
                }
            }
            scan.push_source(Arc::clone(&state.data), state.data_bytes);
            scan
        };

        let delivered = scan.run(consumer)?;
        tracing::debug!(records = delivered, "Iteration finished");
        Ok(())
    }
}

/// Positional read where running out of file means corruption
fn read_record_part(handle: &FileHandle, buf: &mut [u8], offset: u64) -> Result<()> {
    let len = buf.len();
    handle.read_exact_at(buf, offset).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StormError::Corruption(format!(
                "short read of {} bytes at offset {} in {}",
                len,
                offset,
                handle.path().display()
            ))
        } else {
            StormError::Io(e)
        }
    })
}
