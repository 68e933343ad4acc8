//! `embedded-hal` I2C adapter

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use tracing::debug;

use crate::port::{BusError, BusPort};

/// [`BusPort`] over any blocking `embedded-hal` 1.0 I2C bus
pub struct HalBus<I> {
    i2c: I,
    resets: usize,
}

impl<I: I2c> HalBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c, resets: 0 }
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }

    pub fn into_inner(self) -> I {
        self.i2c
    }
}

fn map_error(address: u8, kind: ErrorKind) -> BusError {
    match kind {
        ErrorKind::NoAcknowledge(_) => BusError::NoDevice { address },
        other => BusError::Io(format!("{:?}", other)),
    }
}

impl<I: I2c> BusPort for HalBus<I> {
    fn read_block(&mut self, address: u8, command: u8, length: usize) -> Result<Vec<u8>, BusError> {
        let mut buf = vec![0u8; length];
        self.i2c
            .write_read(address, &[command], &mut buf)
            .map_err(|e| map_error(address, e.kind()))?;
        Ok(buf)
    }

    fn write_block(&mut self, address: u8, command: u8, data: &[u8]) -> Result<(), BusError> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(command);
        frame.extend_from_slice(data);
        self.i2c
            .write(address, &frame)
            .map_err(|e| map_error(address, e.kind()))
    }

    fn reset_session(&mut self) {
        // embedded-hal has no reconnect primitive; the next transaction restarts the bus
        self.resets += 1;
        debug!(resets = self.resets, "I2C session reset requested");
    }
}
