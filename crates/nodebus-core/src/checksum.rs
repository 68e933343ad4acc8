//! Checksum framing for node payloads
//!
//! Every block exchanged with a node carries one trailing checksum byte:
//! the sum of the payload bytes modulo 256. Writes append it, reads strip
//! and verify it.

/// Compute the checksum byte for a payload
pub fn compute(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Check that the last byte of `framed` is the checksum of the bytes before it.
///
/// An empty buffer has no checksum byte and is rejected.
pub fn validate(framed: &[u8]) -> bool {
    match framed.split_last() {
        Some((&checksum, payload)) => compute(payload) == checksum,
        None => false,
    }
}

/// Append the checksum of `payload` and return the framed buffer
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(payload.len() + 1);
    framed.extend_from_slice(payload);
    framed.push(compute(payload));
    framed
}

/// Validate a framed buffer and return the payload without its checksum byte
pub fn strip(framed: &[u8]) -> Option<&[u8]> {
    if validate(framed) {
        framed.split_last().map(|(_, payload)| payload)
    } else {
        None
    }
}
