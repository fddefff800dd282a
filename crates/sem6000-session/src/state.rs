//! Device state owned by a session coordinator.

use chrono::{DateTime, Utc};
use sem6000_protocol::DerivedReading;
use serde::Serialize;

/// What the coordinator currently believes about the plug.
///
/// Only the coordinator mutates this. Callers see clones via
/// [`crate::SessionCoordinator::snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceState {
    latest_sample: Option<DerivedReading>,
    is_on: Option<bool>,
    pending_switch_target: Option<bool>,
    updated_at: Option<DateTime<Utc>>,
}

impl DeviceState {
    /// Most recent reading, cleared on reconnect.
    pub fn latest_sample(&self) -> Option<&DerivedReading> {
        self.latest_sample.as_ref()
    }

    /// Believed relay state. `None` until a sample or acknowledged switch.
    pub fn is_on(&self) -> Option<bool> {
        self.is_on
    }

    /// Target of a switch command still awaiting acknowledgement.
    pub fn pending_switch_target(&self) -> Option<bool> {
        self.pending_switch_target
    }

    /// When the latest sample was applied.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub(crate) fn apply_sample(&mut self, reading: DerivedReading, at: DateTime<Utc>) {
        self.is_on = Some(reading.is_on);
        self.latest_sample = Some(reading);
        self.updated_at = Some(at);
    }

    pub(crate) fn clear_sample(&mut self) {
        self.latest_sample = None;
    }

    /// Record a new switch target, returning the one it replaces.
    pub(crate) fn set_pending_switch(&mut self, target: bool) -> Option<bool> {
        self.pending_switch_target.replace(target)
    }

    /// Adopt the pending target as the relay state. Returns it, or `None`
    /// when no switch was pending.
    pub(crate) fn resolve_pending_switch(&mut self) -> Option<bool> {
        let target = self.pending_switch_target.take()?;
        self.is_on = Some(target);
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(is_on: bool) -> DerivedReading {
        DerivedReading {
            is_on,
            power_watts: 1.5,
            voltage_volts: 230.0,
            current_amps: 0.01,
            frequency_hz: 50,
            power_factor: Some(0.65),
            consumed_energy_kwh: 12.345,
        }
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = DeviceState::default();
        assert!(state.latest_sample().is_none());
        assert_eq!(state.is_on(), None);
        assert_eq!(state.pending_switch_target(), None);
        assert_eq!(state.updated_at(), None);
    }

    #[test]
    fn test_sample_sets_relay_state() {
        let mut state = DeviceState::default();
        let now = Utc::now();
        state.apply_sample(reading(true), now);

        assert_eq!(state.is_on(), Some(true));
        assert_eq!(state.latest_sample(), Some(&reading(true)));
        assert_eq!(state.updated_at(), Some(now));
    }

    #[test]
    fn test_clear_sample_keeps_relay_state() {
        let mut state = DeviceState::default();
        state.apply_sample(reading(false), Utc::now());
        state.clear_sample();

        assert!(state.latest_sample().is_none());
        assert_eq!(state.is_on(), Some(false));
    }

    #[test]
    fn test_pending_switch_lifecycle() {
        let mut state = DeviceState::default();
        assert_eq!(state.set_pending_switch(true), None);
        assert_eq!(state.set_pending_switch(false), Some(true));

        assert_eq!(state.resolve_pending_switch(), Some(false));
        assert_eq!(state.is_on(), Some(false));
        assert_eq!(state.pending_switch_target(), None);

        // Nothing pending: relay state untouched.
        assert_eq!(state.resolve_pending_switch(), None);
        assert_eq!(state.is_on(), Some(false));
    }
}
