//! Raw bus access primitive

use thiserror::Error;

/// Fault raised by a raw bus access
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("No device answered at address {address}")]
    NoDevice { address: u8 },
    #[error("Bus I/O error: {0}")]
    Io(String),
    #[error("Bus timed out")]
    Timeout,
}

/// Byte-level block access to devices on the bus.
///
/// Implementations perform exactly one bus transaction per call and report
/// device absence or a hung bus as a [`BusError`]. They do not retry and do
/// not validate checksums.
pub trait BusPort {
    /// Read `length` raw bytes answered by `address` to `command`
    fn read_block(&mut self, address: u8, command: u8, length: usize) -> Result<Vec<u8>, BusError>;

    /// Send `command` followed by `data` to `address`
    fn write_block(&mut self, address: u8, command: u8, data: &[u8]) -> Result<(), BusError>;

    /// Re-establish the bus connection after a fault
    fn reset_session(&mut self);
}

impl<P: BusPort + ?Sized> BusPort for Box<P> {
    fn read_block(&mut self, address: u8, command: u8, length: usize) -> Result<Vec<u8>, BusError> {
        (**self).read_block(address, command, length)
    }

    fn write_block(&mut self, address: u8, command: u8, data: &[u8]) -> Result<(), BusError> {
        (**self).write_block(address, command, data)
    }

    fn reset_session(&mut self) {
        (**self).reset_session()
    }
}
