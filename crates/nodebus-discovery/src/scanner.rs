//! Discovery scanner that enumerates nodes and negotiates their API level

use nodebus_core::protocol::{
    CANDIDATE_ADDRESSES, DISCOVERY_REVISION_RETRIES, MAX_NODES, READ_REVISION_CODE,
};
use nodebus_core::{NodeHandle, NodeSummary, RevisionCode};
use nodebus_transport::{BusPort, RetryingTransport, SharedBus, TransportConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::probe::probe_address;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryConfigError {
    #[error("Address {0:#04x} is not a 7-bit bus address")]
    InvalidAddress(u8),
    #[error("Address {0} is listed more than once")]
    DuplicateAddress(u8),
    #[error("{0} addresses configured, at most {max} nodes are supported", max = MAX_NODES)]
    TooManyAddresses(usize),
}

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Added to the scan position to form each node's index
    pub index_offset: usize,
    /// Stop after the first address when it holds no node
    pub fast_probe: bool,
    /// Addresses to probe, in scan order
    pub addresses: Vec<u8>,
    /// Retry ceiling for the revision-code read
    pub revision_retries: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            index_offset: 0,
            fast_probe: false,
            addresses: CANDIDATE_ADDRESSES.to_vec(),
            revision_retries: DISCOVERY_REVISION_RETRIES,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<(), DiscoveryConfigError> {
        if self.addresses.len() > MAX_NODES {
            return Err(DiscoveryConfigError::TooManyAddresses(self.addresses.len()));
        }
        let mut seen = HashSet::new();
        for &address in &self.addresses {
            if address > 0x7F {
                return Err(DiscoveryConfigError::InvalidAddress(address));
            }
            if !seen.insert(address) {
                return Err(DiscoveryConfigError::DuplicateAddress(address));
            }
        }
        Ok(())
    }
}

/// Nodes found by one scan, in address-scan order
#[derive(Debug, Clone, Default)]
pub struct DiscoveredNodeSet {
    nodes: Vec<NodeHandle>,
}

impl DiscoveredNodeSet {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeHandle> {
        self.nodes.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, NodeHandle> {
        self.nodes.iter_mut()
    }

    pub fn get_by_address(&self, address: u8) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| n.address() == address)
    }

    pub fn get_by_index(&self, index: usize) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| n.index == index)
    }

    pub fn summaries(&self) -> Vec<NodeSummary> {
        self.nodes.iter().map(NodeHandle::summary).collect()
    }

    pub fn into_vec(self) -> Vec<NodeHandle> {
        self.nodes
    }
}

impl IntoIterator for DiscoveredNodeSet {
    type Item = NodeHandle;
    type IntoIter = std::vec::IntoIter<NodeHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<'a> IntoIterator for &'a DiscoveredNodeSet {
    type Item = &'a NodeHandle;
    type IntoIter = std::slice::Iter<'a, NodeHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Discovery scanner
pub struct NodeScanner {
    config: DiscoveryConfig,
}

impl NodeScanner {
    /// Create a scanner, rejecting invalid address lists
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Probe every configured address and build handles for the ones that answer
    pub fn scan<P: BusPort>(&self, transport: &RetryingTransport<P>) -> DiscoveredNodeSet {
        let fast_probe = self.config.fast_probe;
        let bus = transport.bus();

        if !fast_probe {
            info!(
                addresses = self.config.addresses.len(),
                offset = self.config.index_offset,
                "Searching for nodes"
            );
        }

        let mut nodes = Vec::new();

        for (position, &address) in self.config.addresses.iter().enumerate() {
            let index = position + self.config.index_offset;

            if probe_address(bus, address).is_ok() {
                let mut node = NodeHandle::new(index, address);
                self.negotiate_api_level(transport, &mut node);
                info!(
                    node = index + 1,
                    address,
                    api_level = node.api_level,
                    "Node found"
                );
                nodes.push(node);
            } else if !fast_probe {
                info!(address, "No node at address");
            }

            bus.reset_session();
            bus.inter_probe_delay();

            if fast_probe && nodes.is_empty() {
                debug!(address, "Fast probe found nothing at first address, stopping");
                break;
            }
        }

        DiscoveredNodeSet { nodes }
    }

    fn negotiate_api_level<P: BusPort>(&self, transport: &RetryingTransport<P>, node: &mut NodeHandle) {
        let data = transport.read_block_with_retries(
            node,
            None,
            READ_REVISION_CODE,
            2,
            self.config.revision_retries,
        );

        match RevisionCode::decode(data.as_deref()) {
            RevisionCode::Verified(api_level) => node.api_level = api_level,
            RevisionCode::Unverified(value) => warn!(
                node = node.index + 1,
                address = node.address(),
                revision = value,
                "Unable to verify revision code from node"
            ),
            RevisionCode::Missing => warn!(
                node = node.index + 1,
                address = node.address(),
                "Unable to read revision code from node"
            ),
        }
    }
}

/// Scan the standard candidate addresses with default transport settings
pub fn discover<P: BusPort>(
    index_offset: usize,
    bus: &SharedBus<P>,
    fast_probe: bool,
) -> DiscoveredNodeSet {
    let transport = RetryingTransport::new(bus.clone(), TransportConfig::default());
    let scanner = NodeScanner {
        config: DiscoveryConfig {
            index_offset,
            fast_probe,
            ..DiscoveryConfig::default()
        },
    };
    scanner.scan(&transport)
}
