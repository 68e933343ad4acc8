//! nodebus Transport - Reliable block transport over a shared node bus
//!
//! This crate wraps a raw [`BusPort`] with:
//! - A shared session that serializes all bus traffic across nodes
//! - Checksum validation and bounded retries for reads and writes
//! - A scripted simulator for tests and dry runs
//! - An `embedded-hal` I2C adapter (feature `hal`)

pub mod port;
pub mod session;
pub mod sim;
pub mod transport;

#[cfg(feature = "hal")]
pub mod hal;

pub use port::{BusError, BusPort};
pub use session::{BusConfig, SharedBus, DEFAULT_SETTLE_MS};
pub use sim::{SimBus, SimDevice, SimFault, WriteRecord};
pub use transport::{RetryingTransport, TransportConfig};

#[cfg(feature = "hal")]
pub use hal::HalBus;
