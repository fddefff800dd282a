//! Simulated SEM6000 plug.
//!
//! An in-process firmware emulator implementing [`Transport`]. It answers
//! login, measure and switch commands the way the real plug does, after a
//! configurable latency, and lets tests inject faults: refused connections,
//! failed writes, lost responses, link drops and physical button presses.
//!
//! Readings are derived from a configured load with seeded jitter, so a given
//! seed always produces the same sequence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sem6000_protocol::{CommandId, FrameCodec, MeasurementSample, NotificationEvent};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::SimulatorConfig;
use crate::transport::{NotificationHandler, Transport, TransportError};

/// Largest power the 24-bit wire field can carry, in milliwatts.
const MAX_POWER_MILLIWATTS: u32 = 0x00FF_FFFF;

/// Faults the simulated plug can be told to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultInjection {
    /// Refuse `connect`.
    pub fail_connect: bool,
    /// Fail every `write` without delivering it.
    pub fail_writes: bool,
    /// Accept commands but never answer them.
    pub drop_responses: bool,
}

struct PlugState {
    connected: bool,
    logged_in: bool,
    handler: Option<NotificationHandler>,
    relay_on: bool,
    energy_wh: f64,
    last_metered: Instant,
    rng: ChaCha8Rng,
    faults: FaultInjection,
    written: Vec<Vec<u8>>,
    connects: u32,
}

/// In-process plug emulator.
///
/// Responses are delivered from spawned tasks, so the plug must be driven
/// from within a Tokio runtime.
pub struct SimulatedPlug {
    config: SimulatorConfig,
    state: Arc<Mutex<PlugState>>,
}

impl SimulatedPlug {
    /// Power up a plug with the given behaviour.
    pub fn new(config: SimulatorConfig) -> Self {
        let state = PlugState {
            connected: false,
            logged_in: false,
            handler: None,
            relay_on: config.initially_on,
            energy_wh: config.initial_energy_wh as f64,
            last_metered: Instant::now(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            faults: FaultInjection::default(),
            written: Vec::new(),
            connects: 0,
        };
        SimulatedPlug {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Behaviour this plug was created with.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Replace the active faults.
    pub fn set_faults(&self, faults: FaultInjection) {
        self.state.lock().faults = faults;
    }

    /// Currently active faults.
    pub fn faults(&self) -> FaultInjection {
        self.state.lock().faults
    }

    /// Every frame successfully written so far, oldest first.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    /// Number of times a link was established.
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }

    /// Actual relay position.
    pub fn relay_on(&self) -> bool {
        self.state.lock().relay_on
    }

    /// Whether the current link has completed login.
    pub fn is_logged_in(&self) -> bool {
        self.state.lock().logged_in
    }

    /// Whether a notification handler is installed.
    pub fn has_subscriber(&self) -> bool {
        self.state.lock().handler.is_some()
    }

    /// Toggle the relay with the physical button. The plug reports it with a
    /// switch acknowledgement that no command asked for.
    pub fn press_button(&self) {
        let relay_on = {
            let mut state = self.state.lock();
            state.relay_on = !state.relay_on;
            state.relay_on
        };
        debug!(relay_on, "button pressed");
        self.deliver_later(NotificationEvent::SwitchAck.encode());
    }

    /// Lose the link without the host asking, as when the plug goes out of
    /// range.
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.logged_in = false;
        state.handler = None;
        debug!("link dropped");
    }

    /// Deliver raw bytes to the subscriber immediately, bypassing the
    /// firmware model. Returns false if nobody is subscribed.
    pub fn push_notification(&self, raw: &[u8]) -> bool {
        let handler = self.state.lock().handler.clone();
        match handler {
            Some(handler) => {
                handler(raw);
                true
            }
            None => false,
        }
    }

    fn deliver_later(&self, frame: Vec<u8>) {
        let state = Arc::clone(&self.state);
        let latency = Duration::from_millis(self.config.response_latency_ms);
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let handler = {
                let state = state.lock();
                if !state.connected {
                    return;
                }
                state.handler.clone()
            };
            if let Some(handler) = handler {
                trace!(frame = %hex::encode(&frame), "notify");
                handler(&frame);
            }
        });
    }

    /// Run one command through the firmware model. Returns the notification
    /// to send back, if any.
    fn execute(&self, state: &mut PlugState, raw: &[u8]) -> Option<Vec<u8>> {
        let frame = match FrameCodec::decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, "firmware ignored malformed command");
                return None;
            }
        };

        let response = match CommandId::from_u8(frame.command) {
            Some(CommandId::Login) => {
                state.logged_in = true;
                NotificationEvent::LoginAck
            }
            Some(_) if !state.logged_in => {
                debug!(command = frame.command, "firmware ignored command before login");
                return None;
            }
            Some(CommandId::Measure) => NotificationEvent::Measurement(self.meter(state)),
            Some(CommandId::Switch) => {
                state.relay_on = frame.params.first().is_some_and(|b| *b != 0);
                NotificationEvent::SwitchAck
            }
            None => {
                debug!(command = frame.command, "firmware ignored unsupported command");
                return None;
            }
        };

        if state.faults.drop_responses {
            debug!(command = frame.command, "response dropped");
            return None;
        }
        Some(response.encode())
    }

    fn meter(&self, state: &mut PlugState) -> MeasurementSample {
        let power_watts = if state.relay_on {
            let jitter = if self.config.jitter > 0.0 {
                state.rng.gen_range(-self.config.jitter..self.config.jitter)
            } else {
                0.0
            };
            (self.config.load_watts * (1.0 + jitter)).max(0.0)
        } else {
            0.0
        };

        let now = Instant::now();
        let hours = now.duration_since(state.last_metered).as_secs_f64() / 3600.0;
        state.last_metered = now;
        state.energy_wh += power_watts * hours;

        let voltage = self.config.voltage_volts;
        let current_milliamps = if voltage > 0 && power_watts > 0.0 {
            let amps = power_watts / (voltage as f64 * self.config.power_factor);
            (amps * 1000.0).round().min(u16::MAX as f64) as u16
        } else {
            0
        };

        MeasurementSample {
            is_on: state.relay_on,
            power_milliwatts: ((power_watts * 1000.0).round() as u32).min(MAX_POWER_MILLIWATTS),
            voltage_volts: voltage,
            current_milliamps,
            frequency_hz: self.config.frequency_hz,
            consumed_energy_watt_hours: state.energy_wh as u32,
            energy_width: self.config.energy_width().bytes(),
        }
    }
}

#[async_trait]
impl Transport for SimulatedPlug {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.faults.fail_connect {
            return Err(TransportError::Connect("device not reachable".into()));
        }
        if !state.connected {
            state.connected = true;
            state.connects += 1;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.connected = false;
        state.logged_in = false;
        state.handler = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn write(&self, frame: &[u8]) -> Result<(), TransportError> {
        let response = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            if state.faults.fail_writes {
                return Err(TransportError::Write("characteristic write rejected".into()));
            }
            state.written.push(frame.to_vec());
            self.execute(&mut state, frame)
        };
        if let Some(response) = response {
            self.deliver_later(response);
        }
        Ok(())
    }

    async fn subscribe(&self, handler: NotificationHandler) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::Subscribe("not connected".into()));
        }
        state.handler = Some(handler);
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.state.lock().handler = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sem6000_protocol::{Command, EnergyWidth, SwitchMode};

    fn collecting_handler() -> (NotificationHandler, Arc<Mutex<Vec<Vec<u8>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: NotificationHandler = Arc::new(move |raw| sink.lock().push(raw.to_vec()));
        (handler, seen)
    }

    async fn logged_in_plug(config: SimulatorConfig) -> (SimulatedPlug, Arc<Mutex<Vec<Vec<u8>>>>) {
        let plug = SimulatedPlug::new(config);
        let (handler, seen) = collecting_handler();
        plug.connect().await.expect("should connect");
        plug.subscribe(handler).await.expect("should subscribe");
        plug.write(&Command::Login.encode()).await.expect("should write login");
        tokio::time::sleep(Duration::from_secs(1)).await;
        seen.lock().clear();
        (plug, seen)
    }

    fn measurements(frames: &[Vec<u8>]) -> Vec<MeasurementSample> {
        frames
            .iter()
            .filter_map(|raw| match NotificationEvent::from_bytes(raw) {
                Ok(NotificationEvent::Measurement(sample)) => Some(sample),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_measure_answered_after_login() {
        let (plug, seen) = logged_in_plug(SimulatorConfig::default()).await;
        assert!(plug.is_logged_in());

        plug.write(&Command::Measure.encode()).await.expect("should write measure");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = measurements(&seen.lock());
        assert_eq!(samples.len(), 1);
        assert!(samples[0].is_on);
        assert_eq!(samples[0].voltage_volts, 230);
        assert_eq!(samples[0].frequency_hz, 50);
        assert_eq!(samples[0].energy_width, 4);
        assert!(samples[0].power_milliwatts > 55_000 && samples[0].power_milliwatts < 65_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_ignored_before_login() {
        let plug = SimulatedPlug::new(SimulatorConfig::default());
        let (handler, seen) = collecting_handler();
        plug.connect().await.expect("should connect");
        plug.subscribe(handler).await.expect("should subscribe");

        plug.write(&Command::Measure.encode()).await.expect("should write measure");
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(seen.lock().is_empty());
        assert_eq!(plug.written_frames().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_narrow_energy_on_revision_three() {
        let config = SimulatorConfig {
            hardware_revision: 3,
            ..Default::default()
        };
        assert_eq!(config.energy_width(), EnergyWidth::Narrow);
        let (plug, seen) = logged_in_plug(config).await;

        plug.write(&Command::Measure.encode()).await.expect("should write measure");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let frames = seen.lock().clone();
        assert_eq!(frames.len(), 1);
        // 10 fixed + 2 energy params, 7 bytes of envelope
        assert_eq!(frames[0].len(), 19);
        assert_eq!(measurements(&frames)[0].energy_width, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_moves_relay_and_acks() {
        let (plug, seen) = logged_in_plug(SimulatorConfig::default()).await;

        plug.write(&Command::Switch(SwitchMode::Off).encode())
            .await
            .expect("should write switch");
        assert!(!plug.relay_on());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let frames = seen.lock().clone();
        assert_eq!(
            NotificationEvent::from_bytes(&frames[0]),
            Ok(NotificationEvent::SwitchAck)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_off_reports_no_load() {
        let config = SimulatorConfig {
            initially_on: false,
            ..Default::default()
        };
        let (plug, seen) = logged_in_plug(config).await;

        plug.write(&Command::Measure.encode()).await.expect("should write measure");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let sample = measurements(&seen.lock())[0];
        assert!(!sample.is_on);
        assert_eq!(sample.power_milliwatts, 0);
        assert_eq!(sample.current_milliamps, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_energy_accumulates_over_time() {
        let config = SimulatorConfig {
            jitter: 0.0,
            load_watts: 1000.0,
            ..Default::default()
        };
        let (plug, seen) = logged_in_plug(config).await;

        tokio::time::sleep(Duration::from_secs(3600)).await;
        plug.write(&Command::Measure.encode()).await.expect("should write measure");
        tokio::time::sleep(Duration::from_secs(1)).await;

        let sample = measurements(&seen.lock())[0];
        assert!(sample.consumed_energy_watt_hours >= 1000);
        assert!(sample.consumed_energy_watt_hours <= 1001);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_seed_same_readings() {
        let config = SimulatorConfig {
            seed: 99,
            ..Default::default()
        };
        let (a, seen_a) = logged_in_plug(config.clone()).await;
        let (b, seen_b) = logged_in_plug(config).await;

        for _ in 0..3 {
            a.write(&Command::Measure.encode()).await.expect("should write measure");
            b.write(&Command::Measure.encode()).await.expect("should write measure");
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let power_a: Vec<_> = measurements(&seen_a.lock()).iter().map(|s| s.power_milliwatts).collect();
        let power_b: Vec<_> = measurements(&seen_b.lock()).iter().map(|s| s.power_milliwatts).collect();
        assert_eq!(power_a.len(), 3);
        assert_eq!(power_a, power_b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_faults() {
        let (plug, seen) = logged_in_plug(SimulatorConfig::default()).await;

        plug.set_faults(FaultInjection {
            drop_responses: true,
            ..Default::default()
        });
        plug.write(&Command::Measure.encode()).await.expect("write still succeeds");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(seen.lock().is_empty());

        plug.set_faults(FaultInjection {
            fail_writes: true,
            ..Default::default()
        });
        assert!(matches!(
            plug.write(&Command::Measure.encode()).await,
            Err(TransportError::Write(_))
        ));

        plug.drop_link();
        plug.set_faults(FaultInjection {
            fail_connect: true,
            ..Default::default()
        });
        assert_eq!(
            plug.write(&Command::Measure.encode()).await,
            Err(TransportError::NotConnected)
        );
        assert!(matches!(plug.connect().await, Err(TransportError::Connect(_))));
        assert_eq!(plug.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_press_sends_unsolicited_ack() {
        let (plug, seen) = logged_in_plug(SimulatorConfig::default()).await;
        assert!(plug.relay_on());

        plug.press_button();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!plug.relay_on());
        assert_eq!(
            NotificationEvent::from_bytes(&seen.lock()[0]),
            Ok(NotificationEvent::SwitchAck)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_drops_subscriber_and_login() {
        let (plug, _seen) = logged_in_plug(SimulatorConfig::default()).await;
        plug.disconnect().await.expect("should disconnect");

        assert!(!plug.is_connected());
        assert!(!plug.is_logged_in());
        assert!(!plug.has_subscriber());
        assert!(!plug.push_notification(&[0x0F]));
    }
}
