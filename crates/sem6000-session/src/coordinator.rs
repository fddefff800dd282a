//! Session coordinator for one plug.
//!
//! The coordinator owns the link to a single plug and everything known about
//! it. It runs the login handshake, drives measurement refresh cycles, and
//! reconciles optimistic switch commands with the plug's acknowledgements.
//!
//! Notifications arrive on a transport callback, concurrently with callers.
//! All shared state sits behind one mutex that is never held across an
//! `.await`.
//!
//! The plug handles one request at a time. Callers must not overlap
//! [`SessionCoordinator::refresh`] calls; a refresh that is overtaken by a
//! second one fails with [`RefreshError::Interrupted`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use sem6000_metrics::{metric_defs, SessionLabels};
use sem6000_protocol::{
    peek_command, Command, DerivedReading, MeasurementSample, NotificationEvent, SwitchMode,
    CMD_LOGIN,
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::state::DeviceState;
use crate::transport::{NotificationHandler, Transport, TransportError};

/// Readings buffered per subscriber before the slowest one starts lagging.
const READING_CHANNEL_CAPACITY: usize = 16;

// ============================================================================
// Errors
// ============================================================================

/// Why a refresh cycle failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The link failed during reconnect, login or the measure write.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No measurement arrived before the deadline.
    #[error("no measurement within {after:?}")]
    Timeout {
        /// The deadline that expired.
        after: Duration,
    },

    /// A concurrent refresh replaced this one's waiter.
    #[error("refresh interrupted by a concurrent refresh")]
    Interrupted,
}

impl RefreshError {
    /// Short machine-readable reason, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            RefreshError::Transport(_) => "transport",
            RefreshError::Timeout { .. } => "timeout",
            RefreshError::Interrupted => "interrupted",
        }
    }
}

/// Why a switch command failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The switch frame could not be written.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

// ============================================================================
// Session Phase
// ============================================================================

/// Link lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No usable link.
    #[default]
    Disconnected,
    /// Connected, subscribing and writing the login frame.
    LoggingIn,
    /// Logged in and idle.
    Ready,
    /// Waiting for a measurement.
    Polling,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Disconnected => write!(f, "disconnected"),
            SessionPhase::LoggingIn => write!(f, "logging-in"),
            SessionPhase::Ready => write!(f, "ready"),
            SessionPhase::Polling => write!(f, "polling"),
        }
    }
}

// ============================================================================
// Shared State
// ============================================================================

struct Waiter {
    id: u64,
    tx: oneshot::Sender<DerivedReading>,
}

#[derive(Default)]
struct Shared {
    state: DeviceState,
    phase: SessionPhase,
    waiter: Option<Waiter>,
    next_waiter_id: u64,
    resync_tx: Option<mpsc::UnboundedSender<()>>,
    resync_worker: Option<JoinHandle<()>>,
}

struct Inner<T: Transport> {
    device: String,
    transport: Arc<T>,
    config: SessionConfig,
    labels: SessionLabels,
    shared: Mutex<Shared>,
    readings: broadcast::Sender<DerivedReading>,
}

/// Clears the refresh waiter if it is still the one this guard registered.
///
/// Dropped when the refresh finishes, fails, or is cancelled by its deadline,
/// so a late sample never reaches a caller that has already given up.
struct PendingRefresh<'a> {
    shared: &'a Mutex<Shared>,
    id: u64,
}

impl Drop for PendingRefresh<'_> {
    fn drop(&mut self) {
        let mut shared = self.shared.lock();
        if shared.waiter.as_ref().is_some_and(|w| w.id == self.id) {
            shared.waiter = None;
        }
    }
}

// ============================================================================
// Session Coordinator
// ============================================================================

/// Drives one plug over a [`Transport`].
///
/// Cheap to clone; clones share the same session.
pub struct SessionCoordinator<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for SessionCoordinator<T> {
    fn clone(&self) -> Self {
        SessionCoordinator {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> SessionCoordinator<T> {
    /// Create a coordinator for `device`. Nothing touches the link until
    /// [`start`](Self::start) or [`refresh`](Self::refresh).
    pub fn new(device: impl Into<String>, transport: Arc<T>, config: SessionConfig) -> Self {
        let device = device.into();
        let (readings, _) = broadcast::channel(READING_CHANNEL_CAPACITY);
        SessionCoordinator {
            inner: Arc::new(Inner {
                labels: SessionLabels::new(device.clone()),
                device,
                transport,
                config,
                shared: Mutex::new(Shared::default()),
                readings,
            }),
        }
    }

    /// Device address this session talks to.
    pub fn device(&self) -> &str {
        &self.inner.device
    }

    /// Timing configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.inner.transport
    }

    /// Connect and log in.
    ///
    /// On failure the link is torn down and the error returned; a later
    /// [`refresh`](Self::refresh) retries the login.
    pub async fn start(&self) -> Result<(), TransportError> {
        if let Err(err) = self.inner.connect_and_login().await {
            warn!(device = %self.inner.device, error = %err, "session start failed");
            self.inner.force_disconnect().await;
            return Err(err);
        }
        Ok(())
    }

    /// Request a measurement and wait for it.
    ///
    /// Logs in first if the link is down or this session has not logged in
    /// on it yet, which covers a link the caller opened. The configured
    /// deadline covers the whole cycle. On timeout or transport failure the
    /// link is forced down so the next cycle starts clean.
    pub async fn refresh(&self) -> Result<DerivedReading, RefreshError> {
        let inner = &self.inner;
        let labels = inner.labels.to_labels();
        metrics::counter!(metric_defs::REFRESH_TOTAL.name, labels.as_slice()).increment(1);

        let started = Instant::now();
        let deadline = inner.config.refresh_timeout();
        let result = match tokio::time::timeout(deadline, inner.refresh_cycle()).await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::Timeout { after: deadline }),
        };

        match result {
            Ok(reading) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
                metrics::histogram!(metric_defs::REFRESH_LATENCY.name, labels.as_slice())
                    .record(elapsed_ms);
                debug!(device = %inner.device, elapsed_ms, "refresh complete");
                Ok(reading)
            }
            Err(err) => {
                let failed = inner.labels.with(&[("reason", err.reason().to_string())]);
                metrics::counter!(metric_defs::REFRESH_FAILED.name, failed.as_slice()).increment(1);
                warn!(device = %inner.device, error = %err, "refresh failed");
                // The overtaking refresh owns the link now.
                if err != RefreshError::Interrupted {
                    inner.force_disconnect().await;
                }
                Err(err)
            }
        }
    }

    /// Switch the relay.
    ///
    /// The target is recorded as pending and adopted when the plug
    /// acknowledges. A write failure leaves the target pending; there is no
    /// retry.
    pub async fn send_switch_command(&self, mode: SwitchMode) -> Result<(), CommandError> {
        let inner = &self.inner;
        let previous = inner.shared.lock().state.set_pending_switch(mode.is_on());
        if let Some(previous) = previous {
            warn!(
                device = %inner.device,
                previous,
                requested = %mode,
                "switch sent while a previous switch is unacknowledged, state may desynchronize"
            );
            metrics::counter!(metric_defs::SWITCH_DESYNC.name, inner.labels.to_labels().as_slice())
                .increment(1);
        }

        let labels = inner.labels.with(&[("mode", mode.to_string())]);
        metrics::counter!(metric_defs::SWITCH_COMMANDS.name, labels.as_slice()).increment(1);

        inner
            .transport
            .write(&Command::Switch(mode).encode())
            .await
            .map_err(|err| {
                warn!(device = %inner.device, error = %err, requested = %mode, "switch write failed");
                CommandError::from(err)
            })
    }

    /// Copy of the current device state.
    pub fn snapshot(&self) -> DeviceState {
        self.inner.shared.lock().state.clone()
    }

    /// Current link phase.
    ///
    /// A link that dropped on its own reads as `Disconnected` even before
    /// the next refresh notices.
    pub fn phase(&self) -> SessionPhase {
        let phase = self.inner.shared.lock().phase;
        match phase {
            SessionPhase::Ready | SessionPhase::Polling if !self.inner.transport.is_connected() => {
                SessionPhase::Disconnected
            }
            phase => phase,
        }
    }

    /// Receive every applied measurement, solicited or not.
    pub fn subscribe(&self) -> broadcast::Receiver<DerivedReading> {
        self.inner.readings.subscribe()
    }

    /// Stop the resync worker and tear the link down.
    ///
    /// Transport errors are logged, not returned.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        let worker = {
            let mut shared = inner.shared.lock();
            shared.resync_tx = None;
            shared.waiter = None;
            shared.resync_worker.take()
        };
        if let Some(worker) = worker {
            worker.abort();
        }
        inner.release_link().await;
        info!(device = %inner.device, "session shut down");
    }
}

// ============================================================================
// Internals
// ============================================================================

impl<T: Transport> Inner<T> {
    fn set_phase(&self, phase: SessionPhase) {
        self.shared.lock().phase = phase;
    }

    async fn connect_and_login(self: &Arc<Self>) -> Result<(), TransportError> {
        self.ensure_resync_worker();
        self.set_phase(SessionPhase::LoggingIn);
        if !self.transport.is_connected() {
            debug!(device = %self.device, "connecting");
            self.transport.connect().await?;
        }
        self.transport.subscribe(self.dispatch_handler()).await?;

        tokio::time::sleep(self.config.settle_delay()).await;

        self.transport.write(&Command::Login.encode()).await?;
        self.set_phase(SessionPhase::Ready);

        metrics::counter!(metric_defs::SESSION_LOGINS.name, self.labels.to_labels().as_slice())
            .increment(1);
        info!(device = %self.device, "logged in");
        Ok(())
    }

    async fn refresh_cycle(self: &Arc<Self>) -> Result<DerivedReading, RefreshError> {
        let logged_out = self.shared.lock().phase == SessionPhase::Disconnected;
        if logged_out || !self.transport.is_connected() {
            info!(device = %self.device, "not logged in, connecting");
            self.shared.lock().state.clear_sample();
            self.connect_and_login().await?;
        }

        let (tx, rx) = oneshot::channel();
        let _pending = {
            let mut shared = self.shared.lock();
            let id = shared.next_waiter_id;
            shared.next_waiter_id = shared.next_waiter_id.wrapping_add(1);
            if shared.waiter.replace(Waiter { id, tx }).is_some() {
                warn!(device = %self.device, "refresh overtaken by a concurrent refresh");
            }
            shared.phase = SessionPhase::Polling;
            PendingRefresh {
                shared: &self.shared,
                id,
            }
        };

        self.transport.write(&Command::Measure.encode()).await?;

        let reading = rx.await.map_err(|_| RefreshError::Interrupted)?;
        self.set_phase(SessionPhase::Ready);
        Ok(reading)
    }

    /// Best-effort teardown after a failed cycle.
    async fn force_disconnect(&self) {
        metrics::counter!(
            metric_defs::SESSION_FORCED_DISCONNECTS.name,
            self.labels.to_labels().as_slice()
        )
        .increment(1);
        self.release_link().await;
    }

    async fn release_link(&self) {
        self.set_phase(SessionPhase::Disconnected);
        if let Err(err) = self.transport.unsubscribe().await {
            debug!(device = %self.device, error = %err, "error stopping notifications");
        }
        if let Err(err) = self.transport.disconnect().await {
            debug!(device = %self.device, error = %err, "error disconnecting");
        }
    }

    fn dispatch_handler(self: &Arc<Self>) -> NotificationHandler {
        let weak = Arc::downgrade(self);
        Arc::new(move |raw: &[u8]| {
            if let Some(inner) = weak.upgrade() {
                inner.dispatch(raw);
            }
        })
    }

    fn ensure_resync_worker(self: &Arc<Self>) {
        let mut shared = self.shared.lock();
        if shared.resync_tx.is_some() {
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        shared.resync_tx = Some(tx);
        shared.resync_worker = Some(tokio::spawn(run_resync_worker(Arc::downgrade(self), rx)));
    }

    // ------------------------------------------------------------------------
    // Notification dispatch
    // ------------------------------------------------------------------------

    fn dispatch(&self, raw: &[u8]) {
        trace!(device = %self.device, frame = %hex::encode(raw), "notification");

        // Login confirmations are dropped before decoding, whatever their shape.
        if peek_command(raw) == Some(CMD_LOGIN) {
            return;
        }

        let event = match NotificationEvent::from_bytes(raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    device = %self.device,
                    error = %err,
                    frame = %hex::encode(raw),
                    "dropping undecodable notification"
                );
                let labels = self.labels.with(&[("reason", err.reason().to_string())]);
                metrics::counter!(metric_defs::NOTIFICATIONS_DROPPED.name, labels.as_slice())
                    .increment(1);
                return;
            }
        };

        let kind = match &event {
            NotificationEvent::Measurement(_) => "measurement",
            NotificationEvent::SwitchAck => "switch_ack",
            NotificationEvent::LoginAck => "login_ack",
            NotificationEvent::Unrecognized { .. } => "unrecognized",
        };
        let labels = self.labels.with(&[("kind", kind.to_string())]);
        metrics::counter!(metric_defs::NOTIFICATIONS.name, labels.as_slice()).increment(1);

        match event {
            NotificationEvent::Measurement(sample) => self.apply_measurement(&sample),
            NotificationEvent::SwitchAck => self.apply_switch_ack(),
            NotificationEvent::LoginAck => debug!(device = %self.device, "login acknowledged"),
            NotificationEvent::Unrecognized { command, params } => {
                warn!(
                    device = %self.device,
                    command = format_args!("{:#04x}", command),
                    params = %hex::encode(params),
                    "unrecognized notification"
                );
            }
        }
    }

    fn apply_measurement(&self, sample: &MeasurementSample) {
        let reading = DerivedReading::from(sample);
        let waiter = {
            let mut shared = self.shared.lock();
            shared.state.apply_sample(reading, Utc::now());
            shared.waiter.take()
        };

        let labels = self.labels.to_labels();
        metrics::gauge!(metric_defs::POWER_WATTS.name, labels.as_slice()).set(reading.power_watts);
        metrics::gauge!(metric_defs::ENERGY_KWH.name, labels.as_slice())
            .set(reading.consumed_energy_kwh);

        match waiter {
            Some(waiter) => {
                // Receiver gone means the refresh was cancelled in between.
                let _ = waiter.tx.send(reading);
            }
            None => {
                debug!(device = %self.device, "measurement with no refresh waiting");
                metrics::counter!(metric_defs::STALE_SAMPLES.name, labels.as_slice()).increment(1);
            }
        }

        // No subscribers is fine.
        let _ = self.readings.send(reading);
    }

    fn apply_switch_ack(&self) {
        let mut shared = self.shared.lock();
        let adopted = shared.state.resolve_pending_switch();
        if let Some(target) = adopted {
            drop(shared);
            debug!(device = %self.device, is_on = target, "switch acknowledged");
            return;
        }

        // Unsolicited: someone pressed the button, or an earlier ack was
        // lost. The relay state is unknown until the next measurement.
        if shared.waiter.is_some() {
            drop(shared);
            debug!(device = %self.device, "unexpected switch acknowledgement, measurement already pending");
            return;
        }
        let queued = shared
            .resync_tx
            .as_ref()
            .is_some_and(|tx| tx.send(()).is_ok());
        drop(shared);

        if queued {
            info!(device = %self.device, "unexpected switch acknowledgement, requesting measurement");
            metrics::counter!(metric_defs::SWITCH_RESYNC.name, self.labels.to_labels().as_slice())
                .increment(1);
        } else {
            warn!(device = %self.device, "unexpected switch acknowledgement and no resync worker running");
        }
    }
}

/// Writes one MEASURE per queued resync request while the link is up and no
/// refresh is waiting on its own.
async fn run_resync_worker<T: Transport>(inner: Weak<Inner<T>>, mut rx: mpsc::UnboundedReceiver<()>) {
    while rx.recv().await.is_some() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if !inner.transport.is_connected() {
            debug!(device = %inner.device, "skipping resync, link down");
            continue;
        }
        if inner.shared.lock().waiter.is_some() {
            debug!(device = %inner.device, "skipping resync, refresh in flight");
            continue;
        }
        if let Err(err) = inner.transport.write(&Command::Measure.encode()).await {
            warn!(device = %inner.device, error = %err, "resync measure write failed");
        }
    }
}
