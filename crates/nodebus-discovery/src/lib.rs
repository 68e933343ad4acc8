//! nodebus Discovery - Node enumeration on a fixed address range
//!
//! This crate provides:
//! - Presence probing of a single bus address
//! - A scanner that builds node handles for responsive addresses and
//!   negotiates their API level through the revision-code handshake

pub mod probe;
pub mod scanner;

pub use probe::probe_address;
pub use scanner::{discover, DiscoveredNodeSet, DiscoveryConfig, DiscoveryConfigError, NodeScanner};
