//! Fixed protocol constants shared by every node firmware revision

use crate::checksum;

/// Command that answers with a single byte when a node is present
pub const READ_ADDRESS: u8 = 0x00;

/// Command that answers with the verification byte and the node API level
pub const READ_REVISION_CODE: u8 = 0x22;

/// High byte of every valid revision-code response
pub const REVISION_VERIFY_BYTE: u8 = 0x25;

/// Default retry ceiling for reads and writes (attempts = retries + 1)
pub const MAX_RETRY_COUNT: u32 = 2;

/// Retry ceiling for the revision-code read issued while scanning
pub const DISCOVERY_REVISION_RETRIES: u32 = 2;

/// Nodes at or below this API level expect the command byte inside the
/// checksummed region of a write
pub const LEGACY_FRAMING_MAX_API_LEVEL: u8 = 19;

/// API level of a node whose revision has not been negotiated
pub const DEFAULT_API_LEVEL: u8 = 0;

/// Bus addresses scanned during discovery, in scan order
pub const CANDIDATE_ADDRESSES: [u8; 8] = [8, 10, 12, 14, 16, 18, 20, 22];

/// Maximum number of nodes on one bus segment
pub const MAX_NODES: usize = CANDIDATE_ADDRESSES.len();

/// Build the bytes sent after the command byte of a write
pub fn frame_write(api_level: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.extend_from_slice(payload);
    if api_level <= LEGACY_FRAMING_MAX_API_LEVEL {
        framed.push(command);
    }
    framed.push(checksum::compute(&framed));
    framed
}

/// Decode a big-endian 16-bit value from the first two bytes
pub fn unpack_u16(data: &[u8]) -> Option<u16> {
    match data {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// Outcome of interpreting a revision-code response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionCode {
    /// Verification byte matched; carries the node API level
    Verified(u8),
    /// Response was read but the verification byte was wrong
    Unverified(u16),
    /// No usable response
    Missing,
}

impl RevisionCode {
    /// Interpret the payload of a revision-code read (checksum already stripped)
    pub fn decode(data: Option<&[u8]>) -> Self {
        match data.and_then(unpack_u16) {
            None | Some(0) => Self::Missing,
            Some(value) => {
                let [verify, api_level] = value.to_be_bytes();
                if verify == REVISION_VERIFY_BYTE {
                    Self::Verified(api_level)
                } else {
                    Self::Unverified(value)
                }
            }
        }
    }

    pub fn api_level(&self) -> Option<u8> {
        match self {
            Self::Verified(level) => Some(*level),
            _ => None,
        }
    }
}
