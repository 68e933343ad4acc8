//! Simulated bus for tests and dry runs
//!
//! Devices answer reads from a register table and frame every answer with a
//! valid checksum. Faults are scripted per device and consumed one per raw
//! access, so a test can describe exactly which attempts fail and how.

use std::collections::{BTreeMap, HashMap, VecDeque};

use nodebus_core::checksum;
use nodebus_core::protocol::{READ_ADDRESS, READ_REVISION_CODE};

use crate::port::{BusError, BusPort};

/// Scripted failure for one raw access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    /// Answer with a wrong checksum byte
    Corrupt,
    /// Fail the access with a bus fault
    Fault,
}

/// A simulated node
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    registers: HashMap<u8, Vec<u8>>,
    faults: VecDeque<SimFault>,
    hung: bool,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device answering the revision-code command with `revision`
    pub fn with_revision(revision: u16) -> Self {
        Self::new().with_register(READ_REVISION_CODE, revision.to_be_bytes().to_vec())
    }

    /// Set the payload answered to `command`
    pub fn with_register(mut self, command: u8, payload: Vec<u8>) -> Self {
        self.registers.insert(command, payload);
        self
    }

    /// Queue `count` copies of `fault` for the next accesses
    pub fn with_faults(mut self, fault: SimFault, count: usize) -> Self {
        self.push_faults(fault, count);
        self
    }

    /// Make every access after the probe fail with a timeout
    pub fn hung(mut self) -> Self {
        self.hung = true;
        self
    }

    pub fn push_faults(&mut self, fault: SimFault, count: usize) {
        self.faults.extend(std::iter::repeat(fault).take(count));
    }

    pub fn pending_faults(&self) -> usize {
        self.faults.len()
    }
}

/// A write frame seen by the simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub address: u8,
    pub command: u8,
    pub data: Vec<u8>,
}

/// In-memory bus populated with [`SimDevice`]s
#[derive(Debug, Default)]
pub struct SimBus {
    devices: BTreeMap<u8, SimDevice>,
    writes: Vec<WriteRecord>,
    read_count: usize,
    write_count: usize,
    reset_count: usize,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, address: u8, device: SimDevice) -> Self {
        self.add_device(address, device);
        self
    }

    pub fn add_device(&mut self, address: u8, device: SimDevice) {
        self.devices.insert(address, device);
    }

    pub fn device_mut(&mut self, address: u8) -> Option<&mut SimDevice> {
        self.devices.get_mut(&address)
    }

    /// Raw reads attempted, including faulted ones
    pub fn read_count(&self) -> usize {
        self.read_count
    }

    /// Raw writes attempted, including faulted ones
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    pub fn reset_count(&self) -> usize {
        self.reset_count
    }

    /// Writes that reached a device
    pub fn writes(&self) -> &[WriteRecord] {
        &self.writes
    }

    fn device_for(&mut self, address: u8) -> Result<&mut SimDevice, BusError> {
        self.devices
            .get_mut(&address)
            .ok_or(BusError::NoDevice { address })
    }
}

impl BusPort for SimBus {
    fn read_block(&mut self, address: u8, command: u8, length: usize) -> Result<Vec<u8>, BusError> {
        self.read_count += 1;
        let device = self.device_for(address)?;
        let fault = device.faults.pop_front();
        if fault == Some(SimFault::Fault) {
            return Err(BusError::Io(format!("simulated fault at address {}", address)));
        }
        if device.hung && command != READ_ADDRESS {
            return Err(BusError::Timeout);
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        let mut payload = device.registers.get(&command).cloned().unwrap_or_default();
        payload.resize(length - 1, 0);
        let mut framed = checksum::frame(&payload);
        if fault == Some(SimFault::Corrupt) {
            if let Some(last) = framed.last_mut() {
                *last = last.wrapping_add(1);
            }
        }
        Ok(framed)
    }

    fn write_block(&mut self, address: u8, command: u8, data: &[u8]) -> Result<(), BusError> {
        self.write_count += 1;
        let device = self.device_for(address)?;
        if device.faults.pop_front() == Some(SimFault::Fault) {
            return Err(BusError::Io(format!("simulated fault at address {}", address)));
        }
        if device.hung {
            return Err(BusError::Timeout);
        }
        self.writes.push(WriteRecord {
            address,
            command,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn reset_session(&mut self) {
        self.reset_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_address_faults() {
        let mut bus = SimBus::new();
        assert_eq!(
            bus.read_block(8, 0x00, 1),
            Err(BusError::NoDevice { address: 8 })
        );
        assert_eq!(bus.read_count(), 1);
    }

    #[test]
    fn test_register_read_is_framed() {
        let mut bus = SimBus::new().with_device(10, SimDevice::with_revision(0x2513));
        let data = bus.read_block(10, READ_REVISION_CODE, 3).unwrap();
        assert_eq!(data, vec![0x25, 0x13, 0x38]);
        assert!(checksum::validate(&data));
    }

    #[test]
    fn test_scripted_faults_are_consumed_in_order() {
        let device = SimDevice::with_revision(0x2513)
            .with_faults(SimFault::Corrupt, 1)
            .with_faults(SimFault::Fault, 1);
        let mut bus = SimBus::new().with_device(10, device);

        let corrupt = bus.read_block(10, READ_REVISION_CODE, 3).unwrap();
        assert!(!checksum::validate(&corrupt));
        assert!(bus.read_block(10, READ_REVISION_CODE, 3).is_err());
        assert!(checksum::validate(&bus.read_block(10, READ_REVISION_CODE, 3).unwrap()));
        assert_eq!(bus.device_mut(10).unwrap().pending_faults(), 0);
    }

    #[test]
    fn test_hung_device_still_answers_probe() {
        let mut bus = SimBus::new().with_device(12, SimDevice::new().hung());
        assert!(bus.read_block(12, 0x00, 1).is_ok());
        assert_eq!(bus.read_block(12, READ_REVISION_CODE, 3), Err(BusError::Timeout));
        assert_eq!(bus.write_block(12, 0x51, &[0x00]), Err(BusError::Timeout));
    }

    #[test]
    fn test_writes_are_recorded() {
        let mut bus = SimBus::new().with_device(8, SimDevice::new());
        bus.write_block(8, 0x51, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(
            bus.writes(),
            &[WriteRecord {
                address: 8,
                command: 0x51,
                data: vec![0x01, 0x02, 0x03]
            }]
        );
    }
}
