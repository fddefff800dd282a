//! Notifications pushed by the plug.

use crate::constants::*;
use crate::error::*;
use crate::frame::{Frame, FrameCodec};
use crate::types::*;

/// A notification interpreted by command code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// Measurement sample (reply to a measure request).
    Measurement(MeasurementSample),

    /// A switch transition happened. The resulting state is not reported.
    SwitchAck,

    /// Login acknowledgement. Carries nothing usable and is ignored.
    LoginAck,

    /// Any other command code. Kept for diagnostic logging only.
    Unrecognized {
        /// Command code.
        command: u8,
        /// Raw params.
        params: Vec<u8>,
    },
}

impl NotificationEvent {
    /// Decode a raw notification into an event.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, DecodeError> {
        let frame = FrameCodec::decode(raw)?;
        Self::decode(&frame)
    }

    /// Interpret a decoded frame.
    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        Self::interpret(frame.command, &frame.params)
    }

    /// Interpret params according to the command code.
    pub fn interpret(command: u8, params: &[u8]) -> Result<Self, DecodeError> {
        match CommandId::from_u8(command) {
            Some(CommandId::Login) => Ok(NotificationEvent::LoginAck),
            Some(CommandId::Switch) => Ok(NotificationEvent::SwitchAck),
            Some(CommandId::Measure) => Ok(NotificationEvent::Measurement(decode_measurement(
                params,
            )?)),
            None => Ok(NotificationEvent::Unrecognized {
                command,
                params: params.to_vec(),
            }),
        }
    }

    /// Encode this event as the frame the firmware would push.
    ///
    /// Measurements use the width recorded in the sample, falling back to
    /// [`EnergyWidth::Wide`] for widths no hardware revision uses.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            NotificationEvent::Measurement(sample) => {
                let width = match sample.energy_width {
                    2 => EnergyWidth::Narrow,
                    _ => EnergyWidth::Wide,
                };
                FrameCodec::encode(CMD_MEASURE, &sample.encode_params(width))
            }
            NotificationEvent::SwitchAck => FrameCodec::encode(CMD_SWITCH, &[]),
            NotificationEvent::LoginAck => FrameCodec::encode(CMD_LOGIN, &[]),
            NotificationEvent::Unrecognized { command, params } => {
                FrameCodec::encode(*command, params)
            }
        }
    }
}

/// Parse measurement params.
///
/// Layout:
///
/// ```text
/// 0      is_on
/// 1..4   power, mW, big-endian
/// 4      voltage, V
/// 5..7   current, mA, big-endian
/// 7      frequency, Hz
/// 8..10  padding (not power factor)
/// 10..   consumed energy, Wh, big-endian, 2 or 4 bytes
/// ```
fn decode_measurement(params: &[u8]) -> Result<MeasurementSample, DecodeError> {
    if params.len() < MEASURE_FIXED_LEN
        || params.len() > MEASURE_ENERGY_OFFSET + MEASURE_MAX_ENERGY_WIDTH
    {
        return Err(DecodeError::MalformedMeasurement {
            actual: params.len(),
        });
    }

    let energy = &params[MEASURE_ENERGY_OFFSET..];
    let consumed_energy_watt_hours = energy
        .iter()
        .fold(0u32, |acc, b| (acc << 8) | *b as u32);

    Ok(MeasurementSample {
        is_on: params[0] != 0,
        power_milliwatts: u32::from_be_bytes([0, params[1], params[2], params[3]]),
        voltage_volts: params[4],
        current_milliamps: u16::from_be_bytes([params[5], params[6]]),
        frequency_hz: params[7],
        consumed_energy_watt_hours,
        energy_width: energy.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_bytes() -> Vec<u8> {
        // on, 1500 mW, 230 V, 6500 mA, 50 Hz, padding
        vec![0x01, 0x00, 0x05, 0xDC, 0xE6, 0x19, 0x64, 0x32, 0xAA, 0xBB]
    }

    #[test]
    fn test_measurement_wide_energy() {
        let mut params = fixed_bytes();
        params.extend_from_slice(&12345u32.to_be_bytes());

        let event = NotificationEvent::interpret(CMD_MEASURE, &params).expect("should decode");
        let NotificationEvent::Measurement(sample) = event else {
            panic!("expected measurement");
        };
        assert!(sample.is_on);
        assert_eq!(sample.power_milliwatts, 1500);
        assert_eq!(sample.voltage_volts, 230);
        assert_eq!(sample.current_milliamps, 6500);
        assert_eq!(sample.frequency_hz, 50);
        assert_eq!(sample.consumed_energy_watt_hours, 12345);
        assert_eq!(sample.energy_width, 4);
    }

    #[test]
    fn test_measurement_narrow_energy() {
        let mut params = fixed_bytes();
        params.extend_from_slice(&[0x30, 0x39]);

        match NotificationEvent::interpret(CMD_MEASURE, &params) {
            Ok(NotificationEvent::Measurement(sample)) => {
                assert_eq!(sample.consumed_energy_watt_hours, 0x3039);
                assert_eq!(sample.energy_width, 2);
            }
            other => panic!("expected measurement, got {:?}", other),
        }
    }

    #[test]
    fn test_measurement_padding_is_ignored() {
        let mut a = fixed_bytes();
        let mut b = fixed_bytes();
        b[8] = 0x00;
        b[9] = 0x00;
        a.extend_from_slice(&[0x00, 0x10]);
        b.extend_from_slice(&[0x00, 0x10]);
        assert_eq!(
            NotificationEvent::interpret(CMD_MEASURE, &a),
            NotificationEvent::interpret(CMD_MEASURE, &b)
        );
    }

    #[test]
    fn test_measurement_without_energy_bytes() {
        match NotificationEvent::interpret(CMD_MEASURE, &fixed_bytes()) {
            Ok(NotificationEvent::Measurement(sample)) => {
                assert_eq!(sample.consumed_energy_watt_hours, 0);
                assert_eq!(sample.energy_width, 0);
            }
            other => panic!("expected measurement, got {:?}", other),
        }
    }

    #[test]
    fn test_measurement_too_short() {
        let bytes = fixed_bytes();
        assert_eq!(
            NotificationEvent::interpret(CMD_MEASURE, &bytes[..9]),
            Err(DecodeError::MalformedMeasurement { actual: 9 })
        );
    }

    #[test]
    fn test_measurement_energy_too_wide() {
        let mut params = fixed_bytes();
        params.extend_from_slice(&[0; 5]);
        assert_eq!(
            NotificationEvent::interpret(CMD_MEASURE, &params),
            Err(DecodeError::MalformedMeasurement { actual: 15 })
        );
    }

    #[test]
    fn test_switch_and_login() {
        assert_eq!(
            NotificationEvent::interpret(CMD_SWITCH, &[]),
            Ok(NotificationEvent::SwitchAck)
        );
        assert_eq!(
            NotificationEvent::interpret(CMD_SWITCH, &[0x01]),
            Ok(NotificationEvent::SwitchAck)
        );
        assert_eq!(
            NotificationEvent::interpret(CMD_LOGIN, &[0x00, 0x01]),
            Ok(NotificationEvent::LoginAck)
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            NotificationEvent::interpret(0x0A, &[0x01, 0x02]),
            Ok(NotificationEvent::Unrecognized {
                command: 0x0A,
                params: vec![0x01, 0x02]
            })
        );
    }

    #[test]
    fn test_full_notification_scenario() {
        let sample = MeasurementSample {
            is_on: true,
            power_milliwatts: 1500,
            voltage_volts: 230,
            current_milliamps: 6500,
            frequency_hz: 50,
            consumed_energy_watt_hours: 12345,
            energy_width: 4,
        };
        let raw = NotificationEvent::Measurement(sample).encode();

        let event = NotificationEvent::from_bytes(&raw).expect("should decode notification");
        let NotificationEvent::Measurement(decoded) = event else {
            panic!("expected measurement");
        };
        let reading = DerivedReading::from(&decoded);
        assert!(reading.is_on);
        assert_eq!(reading.power_watts, 1.5);
        assert_eq!(reading.voltage_volts, 230.0);
        assert_eq!(reading.current_amps, 6.5);
        assert_eq!(reading.frequency_hz, 50);
        assert_eq!(reading.consumed_energy_kwh, 12.345);
        let pf = reading.power_factor.expect("power factor present");
        assert!((pf - 0.001).abs() < 0.0001);
    }

    #[test]
    fn test_from_bytes_propagates_frame_errors() {
        assert_eq!(
            NotificationEvent::from_bytes(&[0x00, 0x01, 0x02]),
            Err(DecodeError::InvalidHeader)
        );
    }
}
