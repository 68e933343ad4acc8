//! Single-address presence probing

use nodebus_core::protocol::READ_ADDRESS;
use nodebus_transport::{BusError, BusPort, SharedBus};
use tracing::trace;

/// Check whether a node answers at `address`.
///
/// Issues one raw 1-byte read of the who-is-there command. The answer is not
/// checksum-validated; any reply counts as presence. A fault means the
/// address is empty, which is an expected outcome while scanning.
pub fn probe_address<P: BusPort>(bus: &SharedBus<P>, address: u8) -> Result<(), BusError> {
    match bus.with_bus(|port| port.read_block(address, READ_ADDRESS, 1)) {
        Ok(_) => Ok(()),
        Err(err) => {
            trace!(address, error = %err, "Probe got no answer");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodebus_transport::{BusConfig, SimBus, SimDevice};

    #[test]
    fn test_probe_present_and_absent() {
        let bus = SharedBus::new(
            SimBus::new().with_device(10, SimDevice::new()),
            BusConfig::default(),
        );
        assert!(probe_address(&bus, 10).is_ok());
        assert_eq!(
            probe_address(&bus, 8),
            Err(BusError::NoDevice { address: 8 })
        );
        assert_eq!(bus.with_bus(|sim| sim.read_count()), 2);
    }
}
