//! Protocol constants
//!
//! These constants define the frame delimiters, command codes and measurement
//! layout used by the SEM6000 BLE protocol.

// ============================================================================
// Frame Delimiters
// ============================================================================

/// First byte of every frame, in both directions.
pub const FRAME_HEADER: u8 = 0x0F;
/// Two bytes closing every frame. Never consulted on decode.
pub const FRAME_TRAILER: [u8; 2] = [0xFF, 0xFF];
/// Value of the byte following the command code.
pub const FRAME_RESERVED: u8 = 0x00;
/// Bytes counted by the length field besides the params:
/// command, reserved and checksum.
pub const FRAME_LENGTH_OVERHEAD: usize = 3;
/// Bytes surrounding the counted body: header + length before, trailer after.
pub const FRAME_ENVELOPE: usize = 4;
/// Largest params slice whose length still fits the one-byte length field.
pub const MAX_PARAMS_LEN: usize = u8::MAX as usize - FRAME_LENGTH_OVERHEAD;

// ============================================================================
// Command Codes
// ============================================================================

/// Switch the relay on or off. Acknowledged by a bare notification.
pub const CMD_SWITCH: u8 = 0x03;
/// Request a measurement notification.
pub const CMD_MEASURE: u8 = 0x04;
/// Authenticate with the device PIN.
pub const CMD_LOGIN: u8 = 0x17;

// ============================================================================
// Login
// ============================================================================

/// Login frame for the factory PIN "0000".
///
/// The PIN is not encoded dynamically; this literal is what the device expects
/// for the default PIN and equals `encode(CMD_LOGIN, [0; 9])`.
pub const LOGIN_FRAME_DEFAULT_PIN: [u8; 16] = [
    0x0F, 0x0C, 0x17, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x18, 0xFF,
    0xFF,
];

// ============================================================================
// Measurement Layout
// ============================================================================

/// Number of fixed-offset bytes at the start of a measurement notification.
pub const MEASURE_FIXED_LEN: usize = 10;
/// Offset of the variable-width consumed-energy field.
pub const MEASURE_ENERGY_OFFSET: usize = 10;
/// Widest consumed-energy field seen on any hardware revision.
pub const MEASURE_MAX_ENERGY_WIDTH: usize = 4;
