//! Node state tracked for every peripheral found on the bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::protocol::{self, DEFAULT_API_LEVEL};
use crate::stats::InterfaceStats;

/// A peripheral reachable at a fixed bus address
#[derive(Debug, Clone)]
pub struct NodeHandle {
    /// Logical slot assigned at discovery (offset + scan position)
    pub index: usize,
    address: u8,
    /// Negotiated protocol revision, or the default when negotiation failed
    pub api_level: u8,
    /// Start of the most recent read attempt
    pub io_request_ts: Option<Instant>,
    /// End of the most recent successful raw read
    pub io_response_ts: Option<Instant>,
    read_block_count: u64,
    read_error_count: u64,
    discovered_at: DateTime<Utc>,
}

impl NodeHandle {
    /// Create a node at the given slot and address with the default API level
    pub fn new(index: usize, address: u8) -> Self {
        Self {
            index,
            address,
            api_level: DEFAULT_API_LEVEL,
            io_request_ts: None,
            io_response_ts: None,
            read_block_count: 0,
            read_error_count: 0,
            discovered_at: Utc::now(),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn read_block_count(&self) -> u64 {
        self.read_block_count
    }

    pub fn read_error_count(&self) -> u64 {
        self.read_error_count
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    /// Count one read call, on the node and on the calling interface if any
    pub fn inc_read_block_count(&mut self, interface: Option<&mut InterfaceStats>) {
        self.read_block_count += 1;
        if let Some(stats) = interface {
            stats.read_block_count += 1;
        }
    }

    /// Count one failed read attempt, on the node and on the calling interface if any
    pub fn inc_read_error_count(&mut self, interface: Option<&mut InterfaceStats>) {
        self.read_error_count += 1;
        if let Some(stats) = interface {
            stats.read_error_count += 1;
        }
    }

    /// Latency of the most recent completed read
    pub fn io_latency(&self) -> Option<Duration> {
        match (self.io_request_ts, self.io_response_ts) {
            (Some(request), Some(response)) if response >= request => Some(response - request),
            _ => None,
        }
    }

    /// Whether writes to this node use the legacy framing
    pub fn uses_legacy_framing(&self) -> bool {
        self.api_level <= protocol::LEGACY_FRAMING_MAX_API_LEVEL
    }

    /// Frame a write payload according to this node's API level
    pub fn frame_write(&self, command: u8, payload: &[u8]) -> Vec<u8> {
        protocol::frame_write(self.api_level, command, payload)
    }

    /// Serializable snapshot of this node
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            index: self.index,
            address: self.address,
            api_level: self.api_level,
            read_block_count: self.read_block_count,
            read_error_count: self.read_error_count,
            last_latency_us: self.io_latency().map(|d| d.as_micros() as u64),
            discovered_at: self.discovered_at,
        }
    }
}

/// Snapshot of a node for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub index: usize,
    pub address: u8,
    pub api_level: u8,
    pub read_block_count: u64,
    pub read_error_count: u64,
    /// Latency of the last completed read in microseconds
    pub last_latency_us: Option<u64>,
    pub discovered_at: DateTime<Utc>,
}
