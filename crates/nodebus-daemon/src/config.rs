//! Configuration loading and validation

use nodebus_core::protocol::{CANDIDATE_ADDRESSES, DISCOVERY_REVISION_RETRIES, MAX_RETRY_COUNT};
use nodebus_discovery::{DiscoveryConfig, DiscoveryConfigError};
use nodebus_transport::{BusConfig, SimBus, SimDevice, TransportConfig, DEFAULT_SETTLE_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid discovery settings: {0}")]
    Discovery(#[from] DiscoveryConfigError),
    #[error("Simulated node at address {0} is not in the discovery address list")]
    UnscannedNode(u8),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bus: BusSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default, rename = "simulated_node")]
    pub simulated_nodes: Vec<SimulatedNodeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSection {
    /// Quiet time after the last access before the next probe
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSection {
    /// Retry ceiling for reads and writes
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> u32 {
    MAX_RETRY_COUNT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    /// First node index on this bus segment
    #[serde(default)]
    pub index_offset: usize,
    /// Give up after the first empty address
    #[serde(default)]
    pub fast_probe: bool,
    /// Addresses to scan
    #[serde(default = "default_addresses")]
    pub addresses: Vec<u8>,
    /// Retry ceiling for the revision-code read
    #[serde(default = "default_revision_retries")]
    pub revision_retries: u32,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            index_offset: 0,
            fast_probe: false,
            addresses: default_addresses(),
            revision_retries: default_revision_retries(),
        }
    }
}

fn default_addresses() -> Vec<u8> {
    CANDIDATE_ADDRESSES.to_vec()
}

fn default_revision_retries() -> u32 {
    DISCOVERY_REVISION_RETRIES
}

/// A node answering on the simulated bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedNodeConfig {
    pub address: u8,
    /// Revision code answered (verification byte + API level)
    pub revision: Option<u16>,
    /// Answer the probe but fault every other access
    #[serde(default)]
    pub hung: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let discovery = self.to_discovery_config();
        discovery.validate()?;
        for node in &self.simulated_nodes {
            if !discovery.addresses.contains(&node.address) {
                return Err(ConfigError::UnscannedNode(node.address));
            }
        }
        Ok(())
    }

    pub fn to_bus_config(&self) -> BusConfig {
        BusConfig {
            settle: Duration::from_millis(self.bus.settle_ms),
        }
    }

    pub fn to_transport_config(&self) -> TransportConfig {
        TransportConfig {
            max_retries: self.transport.max_retries,
        }
    }

    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            index_offset: self.discovery.index_offset,
            fast_probe: self.discovery.fast_probe,
            addresses: self.discovery.addresses.clone(),
            revision_retries: self.discovery.revision_retries,
        }
    }

    /// Build a simulated bus populated with the configured nodes
    pub fn to_sim_bus(&self) -> SimBus {
        let mut sim = SimBus::new();
        for node in &self.simulated_nodes {
            let mut device = match node.revision {
                Some(revision) => SimDevice::with_revision(revision),
                None => SimDevice::new(),
            };
            if node.hung {
                device = device.hung();
            }
            sim.add_device(node.address, device);
        }
        sim
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };
    config.validate()?;
    Ok(config)
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<(), ConfigError> {
    let config = Config {
        simulated_nodes: vec![SimulatedNodeConfig {
            address: 8,
            revision: Some(0x2516),
            hung: false,
        }],
        ..Config::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
