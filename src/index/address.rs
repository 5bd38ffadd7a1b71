//! Address codec
//!
//! Tagged pointer from a key to the record slot holding its latest value.

/// Which kind of file an address points into.
///
/// The generation (current or next) is not part of the address; it is
/// resolved through the routing bitsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// A write-log (or, before the write-log's first flush, the write buffer)
    WriteLog,
    /// A compacted data file
    Data,
}

/// Location of a record: a record ordinal within a file of the given role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    role: Role,
    position: u64,
}

impl Address {
    pub fn encode(position: u64, role: Role) -> Self {
        Self { role, position }
    }

    /// Record ordinal, if this address was encoded for `role`
    pub fn decode(self, role: Role) -> Option<u64> {
        (self.role == role).then_some(self.position)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}
