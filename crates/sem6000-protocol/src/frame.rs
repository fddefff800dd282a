//! Frame encoding/decoding utilities.
//!
//! Every SEM6000 frame, in either direction, has the same shape:
//!
//! ```text
//! +------+--------+---------+----------+-----------+----------+-----------+
//! | 0x0F | length | command | reserved | params... | checksum | 0xFF 0xFF |
//! +------+--------+---------+----------+-----------+----------+-----------+
//! ```
//!
//! `length` counts command, reserved, params and checksum, so it always equals
//! `params.len() + 3`. The checksum is `(1 + command + sum(params)) mod 256`.
//!
//! Devices in the field have been seen sending checksums that do not match the
//! formula, so decoding carries the byte without enforcing it. Enable the
//! `strict-checksum` feature to reject mismatches.

use bytes::BufMut;

use crate::constants::*;
use crate::error::DecodeError;

/// A decoded frame, independent of command semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command code.
    pub command: u8,
    /// Byte following the command; zero on every frame seen so far.
    pub reserved: u8,
    /// Command arguments.
    pub params: Vec<u8>,
    /// Checksum byte as received.
    pub checksum: u8,
}

impl Frame {
    /// Value of the length field for this frame.
    pub fn length(&self) -> usize {
        self.params.len() + FRAME_LENGTH_OVERHEAD
    }

    /// Whether the carried checksum agrees with the encode formula.
    pub fn checksum_matches(&self) -> bool {
        checksum(self.command, &self.params) == self.checksum
    }
}

/// Compute the checksum byte for a command and its params.
pub fn checksum(command: u8, params: &[u8]) -> u8 {
    params
        .iter()
        .fold(1u8.wrapping_add(command), |acc, b| acc.wrapping_add(*b))
}

/// Return the command byte of a raw frame without decoding the rest.
///
/// Only the position is checked, not the header.
pub fn peek_command(raw: &[u8]) -> Option<u8> {
    raw.get(2).copied()
}

/// Stateless encoder/decoder for SEM6000 frames.
///
/// BLE notifications always carry whole frames, so no reassembly buffer is
/// needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a command with its params into a wire frame.
    ///
    /// `params` must be at most [`MAX_PARAMS_LEN`] bytes; practical payloads
    /// are under ten.
    pub fn encode(command: u8, params: &[u8]) -> Vec<u8> {
        debug_assert!(params.len() <= MAX_PARAMS_LEN, "params too long for length byte");

        let length = (params.len() + FRAME_LENGTH_OVERHEAD) as u8;
        let mut buf = Vec::with_capacity(params.len() + FRAME_LENGTH_OVERHEAD + FRAME_ENVELOPE);
        buf.put_u8(FRAME_HEADER);
        buf.put_u8(length);
        buf.put_u8(command);
        buf.put_u8(FRAME_RESERVED);
        buf.put_slice(params);
        buf.put_u8(checksum(command, params));
        buf.put_slice(&FRAME_TRAILER);
        buf
    }

    /// Decode a raw frame.
    ///
    /// Bytes past `2 + length` (the trailer, or anything else) are ignored.
    pub fn decode(raw: &[u8]) -> Result<Frame, DecodeError> {
        if raw.len() < 3 || raw[0] != FRAME_HEADER {
            return Err(DecodeError::InvalidHeader);
        }

        let length = raw[1] as usize;
        if length < FRAME_LENGTH_OVERHEAD {
            return Err(DecodeError::Truncated {
                expected: FRAME_LENGTH_OVERHEAD,
                actual: length,
            });
        }
        if raw.len() < 2 + length {
            return Err(DecodeError::Truncated {
                expected: 2 + length,
                actual: raw.len(),
            });
        }

        let body = &raw[2..2 + length];
        let frame = Frame {
            command: body[0],
            reserved: body[1],
            params: body[2..length - 1].to_vec(),
            checksum: body[length - 1],
        };

        #[cfg(feature = "strict-checksum")]
        if !frame.checksum_matches() {
            return Err(DecodeError::ChecksumMismatch {
                expected: checksum(frame.command, &frame.params),
                actual: frame.checksum,
            });
        }

        if !frame.checksum_matches() {
            log::trace!(
                "frame 0x{:02X} checksum 0x{:02X} does not match, accepting anyway",
                frame.command,
                frame.checksum
            );
        }

        Ok(frame)
    }
}
