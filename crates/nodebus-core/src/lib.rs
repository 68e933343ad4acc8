//! nodebus Core - Core types, checksum framing, and node state
//!
//! This crate provides the foundational types for the nodebus system:
//! - Checksum computation and validation for framed payloads
//! - Fixed protocol constants (command codes, address range, retry ceilings)
//! - Per-node state with latency timestamps and read counters
//! - Interface-level counters passed explicitly into transport calls

pub mod checksum;
pub mod node;
pub mod protocol;
pub mod stats;

pub use node::{NodeHandle, NodeSummary};
pub use protocol::RevisionCode;
pub use stats::InterfaceStats;
