//! Common types used in the protocol.

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Command codes understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    /// Relay on/off.
    Switch,
    /// Measurement request.
    Measure,
    /// PIN login.
    Login,
}

impl CommandId {
    /// Look up a command code. Returns `None` for codes outside the known set.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            CMD_SWITCH => Some(CommandId::Switch),
            CMD_MEASURE => Some(CommandId::Measure),
            CMD_LOGIN => Some(CommandId::Login),
            _ => None,
        }
    }

    /// The raw command code.
    pub const fn code(self) -> u8 {
        match self {
            CommandId::Switch => CMD_SWITCH,
            CommandId::Measure => CMD_MEASURE,
            CommandId::Login => CMD_LOGIN,
        }
    }
}

impl From<CommandId> for u8 {
    fn from(id: CommandId) -> Self {
        id.code()
    }
}

/// Relay position requested by a switch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchMode {
    /// Relay closed.
    On,
    /// Relay open.
    Off,
}

impl SwitchMode {
    /// Parameter byte carried by the switch command.
    pub const fn as_byte(self) -> u8 {
        match self {
            SwitchMode::On => 0x01,
            SwitchMode::Off => 0x00,
        }
    }

    /// Whether this mode turns the load on.
    pub const fn is_on(self) -> bool {
        matches!(self, SwitchMode::On)
    }
}

impl From<bool> for SwitchMode {
    fn from(on: bool) -> Self {
        if on {
            SwitchMode::On
        } else {
            SwitchMode::Off
        }
    }
}

impl std::fmt::Display for SwitchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchMode::On => write!(f, "on"),
            SwitchMode::Off => write!(f, "off"),
        }
    }
}

/// Width of the consumed-energy field at the end of a measurement.
///
/// No version field announces it; the decoder infers it from how many bytes
/// follow the fixed layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyWidth {
    /// Two bytes (hardware revision 3, 12-byte payload).
    Narrow,
    /// Four bytes (hardware revision 2, 14-byte payload).
    #[default]
    Wide,
}

impl EnergyWidth {
    /// Number of bytes in the field.
    pub const fn bytes(self) -> usize {
        match self {
            EnergyWidth::Narrow => 2,
            EnergyWidth::Wide => 4,
        }
    }
}

/// Raw measurement reported by the plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementSample {
    /// Relay state.
    pub is_on: bool,
    /// Active power in milliwatts (24-bit on the wire).
    pub power_milliwatts: u32,
    /// Mains voltage in volts.
    pub voltage_volts: u8,
    /// Load current in milliamps.
    pub current_milliamps: u16,
    /// Mains frequency in hertz.
    pub frequency_hz: u8,
    /// Energy counter in watt-hours.
    pub consumed_energy_watt_hours: u32,
    /// Number of bytes the energy counter occupied on the wire.
    pub energy_width: usize,
}

impl MeasurementSample {
    /// Encode this sample as notification params, as the firmware would.
    ///
    /// Values wider than the wire fields are truncated to their low bytes.
    /// Padding bytes 8-9 are written as zero.
    pub fn encode_params(&self, width: EnergyWidth) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MEASURE_FIXED_LEN + width.bytes());
        buf.push(self.is_on as u8);
        buf.extend_from_slice(&self.power_milliwatts.to_be_bytes()[1..]);
        buf.push(self.voltage_volts);
        buf.extend_from_slice(&self.current_milliamps.to_be_bytes());
        buf.push(self.frequency_hz);
        buf.extend_from_slice(&[0x00, 0x00]);
        let energy = self.consumed_energy_watt_hours.to_be_bytes();
        buf.extend_from_slice(&energy[MEASURE_MAX_ENERGY_WIDTH - width.bytes()..]);
        buf
    }
}

/// Measurement converted to engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedReading {
    /// Relay state.
    pub is_on: bool,
    /// Active power in watts.
    pub power_watts: f64,
    /// Mains voltage in volts.
    pub voltage_volts: f64,
    /// Load current in amps.
    pub current_amps: f64,
    /// Mains frequency in hertz.
    pub frequency_hz: u8,
    /// `P / (V * I)` clipped to 1.0; `None` when apparent power is zero.
    pub power_factor: Option<f64>,
    /// Energy counter in kilowatt-hours.
    pub consumed_energy_kwh: f64,
}

impl From<&MeasurementSample> for DerivedReading {
    fn from(sample: &MeasurementSample) -> Self {
        let power_watts = sample.power_milliwatts as f64 / 1000.0;
        let voltage_volts = sample.voltage_volts as f64;
        let current_amps = sample.current_milliamps as f64 / 1000.0;

        let apparent_power = voltage_volts * current_amps;
        let power_factor = if apparent_power > 0.0 {
            Some((power_watts / apparent_power).min(1.0))
        } else {
            None
        };

        DerivedReading {
            is_on: sample.is_on,
            power_watts,
            voltage_volts,
            current_amps,
            frequency_hz: sample.frequency_hz,
            power_factor,
            consumed_energy_kwh: sample.consumed_energy_watt_hours as f64 / 1000.0,
        }
    }
}

impl From<MeasurementSample> for DerivedReading {
    fn from(sample: MeasurementSample) -> Self {
        DerivedReading::from(&sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(power_mw: u32, voltage: u8, current_ma: u16) -> MeasurementSample {
        MeasurementSample {
            is_on: true,
            power_milliwatts: power_mw,
            voltage_volts: voltage,
            current_milliamps: current_ma,
            frequency_hz: 50,
            consumed_energy_watt_hours: 0,
            energy_width: 4,
        }
    }

    #[test]
    fn test_command_id_lookup() {
        assert_eq!(CommandId::from_u8(0x03), Some(CommandId::Switch));
        assert_eq!(CommandId::from_u8(0x04), Some(CommandId::Measure));
        assert_eq!(CommandId::from_u8(0x17), Some(CommandId::Login));
        assert_eq!(CommandId::from_u8(0x05), None);
        assert_eq!(u8::from(CommandId::Login), 0x17);
    }

    #[test]
    fn test_switch_mode_bytes() {
        assert_eq!(SwitchMode::On.as_byte(), 1);
        assert_eq!(SwitchMode::Off.as_byte(), 0);
        assert_eq!(SwitchMode::from(true), SwitchMode::On);
        assert!(!SwitchMode::Off.is_on());
    }

    #[test]
    fn test_energy_width_defaults_to_wide() {
        assert_eq!(EnergyWidth::default(), EnergyWidth::Wide);
        assert_eq!(EnergyWidth::default().bytes(), 4);
    }

    #[test]
    fn test_power_factor_absent_without_apparent_power() {
        assert_eq!(DerivedReading::from(sample(0, 230, 0)).power_factor, None);
        assert_eq!(DerivedReading::from(sample(1500, 0, 6500)).power_factor, None);
        assert_eq!(DerivedReading::from(sample(1500, 230, 0)).power_factor, None);
    }

    #[test]
    fn test_power_factor_zero_power_with_current() {
        // Apparent power present, active power zero: defined and zero.
        assert_eq!(DerivedReading::from(sample(0, 230, 100)).power_factor, Some(0.0));
    }

    #[test]
    fn test_power_factor_unity() {
        // 230 V * 1.000 A = 230 W
        let reading = DerivedReading::from(sample(230_000, 230, 1000));
        assert_eq!(reading.power_factor, Some(1.0));
    }

    #[test]
    fn test_power_factor_clipped() {
        let reading = DerivedReading::from(sample(500_000, 230, 1000));
        assert_eq!(reading.power_factor, Some(1.0));
    }

    #[test]
    fn test_unit_conversion() {
        let mut s = sample(1500, 230, 6500);
        s.consumed_energy_watt_hours = 12345;
        let reading = DerivedReading::from(s);
        assert_eq!(reading.power_watts, 1.5);
        assert_eq!(reading.voltage_volts, 230.0);
        assert_eq!(reading.current_amps, 6.5);
        assert_eq!(reading.frequency_hz, 50);
        assert_eq!(reading.consumed_energy_kwh, 12.345);
        let pf = reading.power_factor.expect("apparent power is non-zero");
        assert!((pf - 1.5 / (230.0 * 6.5)).abs() < 1e-12);
    }

    #[test]
    fn test_encode_params_widths() {
        let mut s = sample(0x01_02_03, 230, 0x0405);
        s.consumed_energy_watt_hours = 0x0A0B_0C0D;

        let wide = s.encode_params(EnergyWidth::Wide);
        assert_eq!(wide.len(), 14);
        assert_eq!(&wide[1..4], &[0x01, 0x02, 0x03]);
        assert_eq!(&wide[5..7], &[0x04, 0x05]);
        assert_eq!(&wide[10..], &[0x0A, 0x0B, 0x0C, 0x0D]);

        let narrow = s.encode_params(EnergyWidth::Narrow);
        assert_eq!(narrow.len(), 12);
        assert_eq!(&narrow[10..], &[0x0C, 0x0D]);
    }
}
