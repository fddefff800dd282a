//! Session, device and simulator configuration.
//!
//! Everything here loads from a single YAML document:
//!
//! ```yaml
//! session:
//!   refresh_timeout_ms: 5000
//!   settle_delay_ms: 2000
//!   poll_interval_ms: 30000
//! device:
//!   address: "A4:C1:38:00:11:22"
//!   name: Desk lamp
//! simulator:
//!   seed: 7
//!   hardware_revision: 3
//!   load_watts: 60.0
//! ```
//!
//! Missing sections and fields take their defaults.

use std::path::Path;
use std::time::Duration;

use sem6000_protocol::EnergyWidth;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid YAML for this schema.
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Session
// ============================================================================

/// Timing knobs for a session coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for a whole refresh cycle, reconnect and login included.
    pub refresh_timeout_ms: u64,

    /// Pause between subscribing and writing the login frame. Some firmware
    /// ignores a login written immediately after connect.
    pub settle_delay_ms: u64,

    /// Interval between refresh cycles when polling.
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            refresh_timeout_ms: 5_000,
            settle_delay_ms: 2_000,
            poll_interval_ms: 30_000,
        }
    }
}

impl SessionConfig {
    /// Refresh deadline as a duration.
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Settle delay as a duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Override the refresh deadline.
    pub fn with_refresh_timeout_ms(mut self, ms: u64) -> Self {
        self.refresh_timeout_ms = ms;
        self
    }

    /// Override the settle delay.
    pub fn with_settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Override the poll interval.
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Reject values that would make a session unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.refresh_timeout_ms must be positive".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Device
// ============================================================================

/// Identity of the plug to talk to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Bluetooth address, any common separator.
    pub address: String,
    /// Display name.
    pub name: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            address: "00:00:00:00:00:00".to_string(),
            name: None,
        }
    }
}

// ============================================================================
// Simulator
// ============================================================================

/// Behaviour of the simulated plug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Seed for the reading jitter.
    pub seed: u64,

    /// Hardware revision: 2 reports a 4-byte energy counter, 3 a 2-byte one.
    pub hardware_revision: u8,

    /// Mains voltage reported.
    pub voltage_volts: u8,

    /// Mains frequency reported.
    pub frequency_hz: u8,

    /// Active power drawn while the relay is on.
    pub load_watts: f64,

    /// Power factor of the load.
    pub power_factor: f64,

    /// Relative jitter applied to power, e.g. 0.02 for ±2%.
    pub jitter: f64,

    /// Energy counter at power-up.
    pub initial_energy_wh: u32,

    /// Relay state at power-up.
    pub initially_on: bool,

    /// Delay before the plug answers a command.
    pub response_latency_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            seed: 0,
            hardware_revision: 2,
            voltage_volts: 230,
            frequency_hz: 50,
            load_watts: 60.0,
            power_factor: 0.95,
            jitter: 0.02,
            initial_energy_wh: 0,
            initially_on: true,
            response_latency_ms: 50,
        }
    }
}

impl SimulatorConfig {
    /// Energy field width for the configured hardware revision.
    pub fn energy_width(&self) -> EnergyWidth {
        match self.hardware_revision {
            3 => EnergyWidth::Narrow,
            _ => EnergyWidth::Wide,
        }
    }

    /// Reject values the simulated firmware cannot represent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.hardware_revision, 2 | 3) {
            return Err(ConfigError::Invalid(format!(
                "simulator.hardware_revision must be 2 or 3, got {}",
                self.hardware_revision
            )));
        }
        if !(self.power_factor > 0.0 && self.power_factor <= 1.0) {
            return Err(ConfigError::Invalid(
                "simulator.power_factor must be in (0, 1]".into(),
            ));
        }
        if self.load_watts < 0.0 || !(0.0..1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(
                "simulator.load_watts must be non-negative and jitter in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Top Level
// ============================================================================

/// The complete configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Coordinator timing.
    pub session: SessionConfig,
    /// Target device.
    pub device: DeviceConfig,
    /// Simulated plug behaviour.
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Render as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.simulator.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.refresh_timeout(), Duration::from_secs(5));
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = SessionConfig::default()
            .with_refresh_timeout_ms(1_000)
            .with_settle_delay_ms(0)
            .with_poll_interval_ms(250);
        assert_eq!(config.refresh_timeout(), Duration::from_secs(1));
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_yaml_str("{}").expect("should parse empty document");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let yaml = "session:\n  settle_delay_ms: 10\nsimulator:\n  hardware_revision: 3\n";
        let config = AppConfig::from_yaml_str(yaml).expect("should parse partial document");
        assert_eq!(config.session.settle_delay_ms, 10);
        assert_eq!(config.session.refresh_timeout_ms, 5_000);
        assert_eq!(config.simulator.energy_width(), EnergyWidth::Narrow);
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = AppConfig::default();
        config.device.name = Some("Desk lamp".into());
        config.simulator.seed = 42;

        let yaml = config.to_yaml().expect("should serialize");
        let parsed = AppConfig::from_yaml_str(&yaml).expect("should parse own output");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = AppConfig::from_yaml_str("session:\n  refresh_timeout_ms: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_revision_rejected() {
        let result = AppConfig::from_yaml_str("simulator:\n  hardware_revision: 4\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_yaml() {
        let result = AppConfig::from_yaml_str("session: [1, 2");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::load("/nonexistent/sem6000.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
