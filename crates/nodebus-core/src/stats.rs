//! Interface-level I/O counters

use serde::{Deserialize, Serialize};

/// Counters owned by the interface that issues reads and writes.
///
/// Passed by reference into every transport call; never shared globally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStats {
    pub read_block_count: u64,
    pub read_error_count: u64,
    pub write_block_count: u64,
    pub write_error_count: u64,
}

impl InterfaceStats {
    pub fn inc_write_block_count(&mut self) {
        self.write_block_count += 1;
    }

    pub fn inc_write_error_count(&mut self) {
        self.write_error_count += 1;
    }

    /// Total failed attempts in both directions
    pub fn error_count(&self) -> u64 {
        self.read_error_count + self.write_error_count
    }
}
