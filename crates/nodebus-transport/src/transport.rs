//! Checksum-validated, bounded-retry block transport
//!
//! Every call makes at most `max_retries + 1` attempts. Bus faults reset the
//! bus session before the next attempt; checksum mismatches do not, since the
//! device did answer. Exhaustion is reported as `None` / `false` and never as
//! an error.

use std::fmt;
use std::time::Instant;

use nodebus_core::protocol::MAX_RETRY_COUNT;
use nodebus_core::{checksum, InterfaceStats, NodeHandle};
use tracing::{debug, info, warn};

use crate::port::{BusError, BusPort};
use crate::session::SharedBus;

/// Transport configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Retry ceiling used when a call does not supply its own
    pub max_retries: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRY_COUNT,
        }
    }
}

/// Why an attempt is being retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryCause {
    Checksum,
    BusFault,
}

impl fmt::Display for RetryCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryCause::Checksum => write!(f, "checksum"),
            RetryCause::BusFault => write!(f, "bus fault"),
        }
    }
}

/// What to log after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryLog {
    /// First retry of a call; occasional single retries are expected
    Quiet,
    Retry,
    LimitReached,
}

impl RetryLog {
    fn for_attempt(retry_count: u32, max_retries: u32) -> Self {
        if retry_count > max_retries {
            RetryLog::LimitReached
        } else if retry_count > 1 {
            RetryLog::Retry
        } else {
            RetryLog::Quiet
        }
    }
}

/// Reads and writes node blocks over a [`SharedBus`]
pub struct RetryingTransport<P> {
    bus: SharedBus<P>,
    config: TransportConfig,
}

impl<P: BusPort> RetryingTransport<P> {
    pub fn new(bus: SharedBus<P>, config: TransportConfig) -> Self {
        Self { bus, config }
    }

    pub fn bus(&self) -> &SharedBus<P> {
        &self.bus
    }

    pub fn config(&self) -> TransportConfig {
        self.config
    }

    /// Read `size` payload bytes with the configured retry ceiling
    pub fn read_block(
        &self,
        node: &mut NodeHandle,
        interface: Option<&mut InterfaceStats>,
        command: u8,
        size: usize,
    ) -> Option<Vec<u8>> {
        self.read_block_with_retries(node, interface, command, size, self.config.max_retries)
    }

    /// Read `size` payload bytes, retrying at most `max_retries` times.
    ///
    /// The device is asked for `size + 1` bytes; the trailing checksum byte
    /// is validated and stripped. Returns `None` once every attempt failed.
    pub fn read_block_with_retries(
        &self,
        node: &mut NodeHandle,
        mut interface: Option<&mut InterfaceStats>,
        command: u8,
        size: usize,
        max_retries: u32,
    ) -> Option<Vec<u8>> {
        node.inc_read_block_count(interface.as_deref_mut());
        let address = node.address();
        let mut retry_count = 0;

        while retry_count <= max_retries {
            let raw = self.bus.with_bus(|port| {
                node.io_request_ts = Some(Instant::now());
                let data = port.read_block(address, command, size + 1)?;
                node.io_response_ts = Some(Instant::now());
                Ok::<_, BusError>(data)
            });

            let cause = match raw {
                Ok(data) => match checksum::strip(&data) {
                    Some(payload) => return Some(payload.to_vec()),
                    None => {
                        debug!(address, command, data = ?data, "Invalid checksum");
                        RetryCause::Checksum
                    }
                },
                Err(err) => {
                    debug!(address, command, error = %err, "Read error");
                    self.bus.reset_session();
                    RetryCause::BusFault
                }
            };

            retry_count += 1;
            self.log_read_retry(cause, address, command, size, retry_count, max_retries);
            node.inc_read_error_count(interface.as_deref_mut());
        }

        None
    }

    /// Write a payload with the configured retry ceiling
    pub fn write_block(
        &self,
        node: &NodeHandle,
        interface: &mut InterfaceStats,
        command: u8,
        payload: &[u8],
    ) -> bool {
        self.write_block_with_retries(node, interface, command, payload, self.config.max_retries)
    }

    /// Frame and write a payload, retrying bus faults at most `max_retries` times.
    ///
    /// Returns `false` once every attempt failed.
    pub fn write_block_with_retries(
        &self,
        node: &NodeHandle,
        interface: &mut InterfaceStats,
        command: u8,
        payload: &[u8],
        max_retries: u32,
    ) -> bool {
        interface.inc_write_block_count();
        let address = node.address();
        let framed = node.frame_write(command, payload);
        let mut retry_count = 0;

        while retry_count <= max_retries {
            match self.bus.with_bus(|port| port.write_block(address, command, &framed)) {
                Ok(()) => return true,
                Err(err) => {
                    debug!(address, command, error = %err, "Write error");
                    self.bus.reset_session();
                    retry_count += 1;
                    self.log_write_retry(address, command, payload, retry_count, max_retries);
                    interface.inc_write_error_count();
                }
            }
        }

        false
    }

    /// Put the node into its firmware bootloader.
    ///
    /// Not supported over this transport; no bus traffic is generated.
    pub fn enter_bootloader(&self, node: &mut NodeHandle) {
        debug!(
            address = node.address(),
            api_level = node.api_level,
            "Bootloader entry not supported, ignoring"
        );
    }

    fn log_read_retry(
        &self,
        cause: RetryCause,
        address: u8,
        command: u8,
        size: usize,
        retry_count: u32,
        max_retries: u32,
    ) {
        match RetryLog::for_attempt(retry_count, max_retries) {
            RetryLog::Quiet => {}
            RetryLog::Retry => info!(
                address,
                command,
                size,
                retry = retry_count,
                ts = self.bus.timestamp(),
                "Retry ({}) in read_block",
                cause
            ),
            RetryLog::LimitReached => warn!(
                address,
                command,
                size,
                retry = retry_count,
                ts = self.bus.timestamp(),
                "Retry ({}) limit reached in read_block",
                cause
            ),
        }
    }

    fn log_write_retry(
        &self,
        address: u8,
        command: u8,
        payload: &[u8],
        retry_count: u32,
        max_retries: u32,
    ) {
        let cause = RetryCause::BusFault;
        match RetryLog::for_attempt(retry_count, max_retries) {
            RetryLog::Quiet => {}
            RetryLog::Retry => info!(
                address,
                command,
                data = ?payload,
                retry = retry_count,
                ts = self.bus.timestamp(),
                "Retry ({}) in write_block",
                cause
            ),
            RetryLog::LimitReached => warn!(
                address,
                command,
                data = ?payload,
                retry = retry_count,
                ts = self.bus.timestamp(),
                "Retry ({}) limit reached in write_block",
                cause
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BusConfig;
    use crate::sim::{SimBus, SimDevice, SimFault, WriteRecord};
    use nodebus_core::protocol::READ_REVISION_CODE;
    use std::time::Duration;
    use tracing_test::traced_test;

    const NODE_ADDR: u8 = 10;

    fn transport(device: SimDevice) -> RetryingTransport<SimBus> {
        let bus = SharedBus::new(
            SimBus::new().with_device(NODE_ADDR, device),
            BusConfig {
                settle: Duration::ZERO,
            },
        );
        RetryingTransport::new(bus, TransportConfig::default())
    }

    fn count_lines(lines: &[&str], needle: &str) -> usize {
        lines.iter().filter(|line| line.contains(needle)).count()
    }

    #[test]
    fn test_retry_log_suppresses_first_retry() {
        assert_eq!(RetryLog::for_attempt(1, 2), RetryLog::Quiet);
        assert_eq!(RetryLog::for_attempt(2, 2), RetryLog::Retry);
        assert_eq!(RetryLog::for_attempt(3, 2), RetryLog::LimitReached);
        // With no retries allowed the only failure is terminal
        assert_eq!(RetryLog::for_attempt(1, 0), RetryLog::LimitReached);
    }

    #[test]
    fn test_clean_read_succeeds_first_attempt() {
        let transport = transport(SimDevice::with_revision(0x2513));
        let mut node = NodeHandle::new(0, NODE_ADDR);
        let mut stats = InterfaceStats::default();

        let data = transport.read_block(&mut node, Some(&mut stats), READ_REVISION_CODE, 2);

        assert_eq!(data, Some(vec![0x25, 0x13]));
        assert_eq!(node.read_block_count(), 1);
        assert_eq!(node.read_error_count(), 0);
        assert_eq!(stats.read_block_count, 1);
        assert_eq!(stats.read_error_count, 0);
        assert!(node.io_latency().is_some());
        assert_eq!(transport.bus().with_bus(|sim| sim.read_count()), 1);
    }

    #[test]
    fn test_raw_read_requests_checksum_byte() {
        let device = SimDevice::new().with_register(0x01, vec![0xAA, 0xBB, 0xCC, 0xDD]);
        let transport = transport(device);
        let mut node = NodeHandle::new(0, NODE_ADDR);

        let data = transport.read_block(&mut node, None, 0x01, 4);

        assert_eq!(data, Some(vec![0xAA, 0xBB, 0xCC, 0xDD]));
    }

    #[test]
    fn test_checksum_errors_recover_without_reset() {
        for k in 1..=MAX_RETRY_COUNT as usize {
            let transport =
                transport(SimDevice::with_revision(0x2513).with_faults(SimFault::Corrupt, k));
            let mut node = NodeHandle::new(0, NODE_ADDR);
            let mut stats = InterfaceStats::default();

            let data = transport.read_block(&mut node, Some(&mut stats), READ_REVISION_CODE, 2);

            assert_eq!(data, Some(vec![0x25, 0x13]), "k={}", k);
            assert_eq!(node.read_error_count(), k as u64);
            assert_eq!(stats.read_error_count, k as u64);
            assert_eq!(transport.bus().with_bus(|sim| sim.reset_count()), 0);
            assert_eq!(transport.bus().with_bus(|sim| sim.read_count()), k + 1);
        }
    }

    #[test]
    fn test_checksum_exhaustion_returns_none() {
        let transport =
            transport(SimDevice::with_revision(0x2513).with_faults(SimFault::Corrupt, 10));
        let mut node = NodeHandle::new(0, NODE_ADDR);

        assert_eq!(transport.read_block(&mut node, None, READ_REVISION_CODE, 2), None);
        assert_eq!(node.read_error_count(), 3);
        assert_eq!(transport.bus().with_bus(|sim| sim.reset_count()), 0);
    }

    #[test]
    #[traced_test]
    fn test_faulting_read_exhausts_and_resets() {
        let transport = transport(SimDevice::with_revision(0x2513).hung());
        let mut node = NodeHandle::new(0, NODE_ADDR);
        let mut stats = InterfaceStats::default();

        let data = transport.read_block(&mut node, Some(&mut stats), READ_REVISION_CODE, 2);

        assert_eq!(data, None);
        assert_eq!(node.read_block_count(), 1);
        assert_eq!(node.read_error_count(), 3);
        assert_eq!(stats.read_error_count, 3);
        assert_eq!(transport.bus().with_bus(|sim| sim.read_count()), 3);
        assert_eq!(transport.bus().with_bus(|sim| sim.reset_count()), 3);
        assert!(node.io_request_ts.is_some());
        assert!(node.io_response_ts.is_none());

        logs_assert(|lines: &[&str]| {
            match (
                count_lines(lines, "limit reached in read_block"),
                count_lines(lines, "Retry (bus fault) in read_block"),
            ) {
                (1, 1) => Ok(()),
                (limit, retry) => Err(format!("limit lines: {}, retry lines: {}", limit, retry)),
            }
        });
    }

    #[test]
    #[traced_test]
    fn test_single_retry_is_not_logged() {
        let transport =
            transport(SimDevice::with_revision(0x2513).with_faults(SimFault::Fault, 1));
        let mut node = NodeHandle::new(0, NODE_ADDR);

        let data = transport.read_block(&mut node, None, READ_REVISION_CODE, 2);

        assert_eq!(data, Some(vec![0x25, 0x13]));
        assert_eq!(node.read_error_count(), 1);
        assert_eq!(transport.bus().with_bus(|sim| sim.reset_count()), 1);
        assert!(!logs_contain("Retry (bus fault)"));
        assert!(!logs_contain("limit reached"));
    }

    #[test]
    fn test_per_call_retry_ceiling() {
        let transport = transport(SimDevice::with_revision(0x2513).hung());
        let mut node = NodeHandle::new(0, NODE_ADDR);

        let data = transport.read_block_with_retries(&mut node, None, READ_REVISION_CODE, 2, 5);

        assert_eq!(data, None);
        assert_eq!(node.read_error_count(), 6);
        assert_eq!(transport.bus().with_bus(|sim| sim.read_count()), 6);
    }

    #[test]
    fn test_write_legacy_framing() {
        let transport = transport(SimDevice::new());
        let mut node = NodeHandle::new(0, NODE_ADDR);
        node.api_level = 19;
        let mut stats = InterfaceStats::default();

        assert!(transport.write_block(&node, &mut stats, 0x05, &[0x01, 0x02]));

        let writes = transport.bus().with_bus(|sim| sim.writes().to_vec());
        assert_eq!(
            writes,
            vec![WriteRecord {
                address: NODE_ADDR,
                command: 0x05,
                data: vec![0x01, 0x02, 0x05, 0x08],
            }]
        );
        assert_eq!(stats.write_block_count, 1);
        assert_eq!(stats.write_error_count, 0);
    }

    #[test]
    fn test_write_current_framing() {
        let transport = transport(SimDevice::new());
        let mut node = NodeHandle::new(0, NODE_ADDR);
        node.api_level = 20;
        let mut stats = InterfaceStats::default();

        assert!(transport.write_block(&node, &mut stats, 0x05, &[0x01, 0x02]));

        let writes = transport.bus().with_bus(|sim| sim.writes().to_vec());
        assert_eq!(writes[0].data, vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_write_recovers_from_fault() {
        let transport = transport(SimDevice::new().with_faults(SimFault::Fault, 2));
        let node = NodeHandle::new(0, NODE_ADDR);
        let mut stats = InterfaceStats::default();

        assert!(transport.write_block(&node, &mut stats, 0x51, &[0x10]));
        assert_eq!(stats.write_block_count, 1);
        assert_eq!(stats.write_error_count, 2);
        assert_eq!(transport.bus().with_bus(|sim| sim.reset_count()), 2);
        assert_eq!(transport.bus().with_bus(|sim| sim.writes().len()), 1);
    }

    #[test]
    #[traced_test]
    fn test_write_exhaustion_returns_false() {
        let transport = transport(SimDevice::new().hung());
        let node = NodeHandle::new(0, NODE_ADDR);
        let mut stats = InterfaceStats::default();

        assert!(!transport.write_block(&node, &mut stats, 0x51, &[0x10]));
        assert_eq!(stats.write_block_count, 1);
        assert_eq!(stats.write_error_count, 3);
        assert_eq!(node.read_error_count(), 0);
        assert_eq!(transport.bus().with_bus(|sim| sim.write_count()), 3);
        assert_eq!(transport.bus().with_bus(|sim| sim.reset_count()), 3);

        logs_assert(|lines: &[&str]| match count_lines(lines, "limit reached in write_block") {
            1 => Ok(()),
            n => Err(format!("expected one limit line, got {}", n)),
        });
    }

    #[test]
    fn test_write_frame_is_reused_across_retries() {
        let transport = transport(SimDevice::new().with_faults(SimFault::Fault, 1));
        let node = NodeHandle::new(0, NODE_ADDR);
        let mut stats = InterfaceStats::default();

        assert!(transport.write_block(&node, &mut stats, 0x05, &[0x01, 0x02]));

        // Legacy framing appended once, not once per attempt
        let writes = transport.bus().with_bus(|sim| sim.writes().to_vec());
        assert_eq!(writes[0].data, vec![0x01, 0x02, 0x05, 0x08]);
    }

    #[test]
    fn test_enter_bootloader_is_silent_on_bus() {
        let transport = transport(SimDevice::new());
        let mut node = NodeHandle::new(0, NODE_ADDR);

        transport.enter_bootloader(&mut node);

        assert_eq!(transport.bus().with_bus(|sim| sim.read_count() + sim.write_count()), 0);
    }
}
