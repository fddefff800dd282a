//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when decoding an inbound frame.
///
/// None of these are fatal to a session: the frame is logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// First byte is not the frame header, or the input is too short to hold
    /// a header, length and command.
    #[error("invalid frame header")]
    InvalidHeader,

    /// Fewer bytes are present than the length field implies, or the length
    /// field is too small to hold command, reserved and checksum bytes.
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Measurement params are shorter than the fixed layout or the trailing
    /// energy field is wider than any known hardware revision.
    #[error("malformed measurement: {actual} param bytes")]
    MalformedMeasurement {
        /// Param bytes received.
        actual: usize,
    },

    /// Checksum byte disagrees with the encode formula.
    #[cfg(feature = "strict-checksum")]
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        /// Checksum computed from the frame contents.
        expected: u8,
        /// Checksum carried by the frame.
        actual: u8,
    },
}

impl DecodeError {
    /// Short machine-readable reason, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::InvalidHeader => "invalid_header",
            DecodeError::Truncated { .. } => "truncated",
            DecodeError::MalformedMeasurement { .. } => "malformed_measurement",
            #[cfg(feature = "strict-checksum")]
            DecodeError::ChecksumMismatch { .. } => "checksum_mismatch",
        }
    }
}
