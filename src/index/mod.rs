//! Index Module
//!
//! In-memory key → address mapping, rebuilt from disk on every open.
//!
//! ## Responsibilities
//! - Single source of truth for where the latest value of a key lives
//! - Address encoding (role + record ordinal)
//! - Routing bitsets that pick the physical file for a key

mod address;
mod routing;

use std::collections::HashMap;

pub use address::{Address, Role};
pub use routing::{resolve, FileRole, NextRouting};

/// Key → address map. The latest insert for a key wins.
#[derive(Debug, Default)]
pub struct Index {
    map: HashMap<u32, Address>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: u32) -> Option<Address> {
        self.map.get(&key).copied()
    }

    /// Point `key` at `address`, returning the address it replaced
    pub fn insert(&mut self, key: u32, address: Address) -> Option<Address> {
        self.map.insert(key, address)
    }

    pub fn contains(&self, key: u32) -> bool {
        self.map.contains_key(&key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
