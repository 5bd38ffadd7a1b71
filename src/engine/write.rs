//! Append path: `put` and `flush`.

use crate::block::{key_from_bytes, RESERVED_KEY};
use crate::error::{Result, StormError};
use crate::index::{Address, Role};

use super::Engine;

impl Engine {
    /// Store `value` under `key`.
    ///
    /// `value` must hold at least `value_size` bytes; only the first
    /// `value_size` are stored.
    pub fn put(&self, key: u32, value: &[u8]) -> Result<()> {
        self.put_at(key, value, 0)
    }

    /// Store `value_size` bytes of `value`, starting at `offset`, under `key`
    ///
    /// Steps:
    /// 1. Reject the reserved key and short values (no lock taken)
    /// 2. Acquire the state write lock
    /// 3. Flush the write buffer if it is full
    /// 4. Append to the write buffer
    /// 5. Point the index at the new record and mark the routing bitset
    pub fn put_at(&self, key: u32, value: &[u8], offset: usize) -> Result<()> {
        if key == RESERVED_KEY {
            return Err(StormError::ReservedKey(key));
        }
        let value_size = self.layout.value_size();
        if value.len() < offset.saturating_add(value_size) {
            return Err(StormError::InvalidValueLength {
                expected: value_size,
                actual: value.len().saturating_sub(offset),
            });
        }

        let mut state = self.state.write();

        if state.buffer.is_full() {
            state.flush_buffer(self.config.wal_sync_strategy)?;
        }

        let buffer_offset = state.buffer.add(key, value, offset)?;

        // The buffer starts where the durable part of the active log ends
        let ordinal = self.layout.ordinal_at(state.wal_bytes + buffer_offset as u64);
        state.index.insert(key, Address::encode(ordinal, Role::WriteLog));
        state.mark_in_active_log(key);

        Ok(())
    }

    /// Store `value` under a 4-byte big-endian key
    pub fn put_bytes(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put(key_from_bytes(key)?, value)
    }

    /// Flush the write buffer to the active write-log (public API)
    ///
    /// Returns the number of bytes written
    pub fn flush(&self) -> Result<usize> {
        self.state.write().flush_buffer(self.config.wal_sync_strategy)
    }
}
