//! Metrics declarations for SEM6000 plug sessions.
//!
//! Every metric a session emits is declared here as a [`Metric`] constant so
//! names, units and label keys live in one place. The `metrics` crate is
//! re-exported; without an installed recorder all emissions are no-ops.
//!
//! # Example
//!
//! ```rust,ignore
//! use sem6000_metrics::{describe_metrics, metric_defs, SessionLabels};
//!
//! describe_metrics();
//!
//! let labels = SessionLabels::new("a4:c1:38:00:11:22").to_labels();
//! metrics::counter!(metric_defs::REFRESH_TOTAL.name, labels.as_slice()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use sem6000_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const FRAMES: Metric = Metric::counter("sem6000.frames")
///     .with_description("Frames seen")
///     .with_unit(Unit::Count)
///     .with_labels(&["device"]);
///
/// assert_eq!(FRAMES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "sem6000.session.refresh_total").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Declares a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declares a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Declares a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for plug sessions.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Standard Label Keys
    // ========================================================================

    /// Labels present on every session metric.
    pub const STANDARD_LABELS: &[&str] = &["device"];

    // ========================================================================
    // Link
    // ========================================================================

    /// Connect + login sequences run.
    pub const SESSION_LOGINS: Metric = Metric::counter("sem6000.session.logins")
        .with_description("Connect and login sequences run")
        .with_unit(Unit::Count)
        .with_labels(&["device"]);

    /// Forced disconnects after a failed cycle.
    pub const SESSION_FORCED_DISCONNECTS: Metric =
        Metric::counter("sem6000.session.forced_disconnects")
            .with_description("Links torn down after a failed refresh")
            .with_unit(Unit::Count)
            .with_labels(&["device"]);

    // ========================================================================
    // Refresh Cycle
    // ========================================================================

    /// Refresh cycles started.
    pub const REFRESH_TOTAL: Metric = Metric::counter("sem6000.refresh.total")
        .with_description("Refresh cycles started")
        .with_unit(Unit::Count)
        .with_labels(&["device"]);

    /// Refresh cycles that failed.
    ///
    /// Labels: device, reason (timeout, transport, interrupted)
    pub const REFRESH_FAILED: Metric = Metric::counter("sem6000.refresh.failed")
        .with_description("Refresh cycles that failed")
        .with_unit(Unit::Count)
        .with_labels(&["device", "reason"]);

    /// Time from refresh start to sample delivery.
    pub const REFRESH_LATENCY: Metric = Metric::histogram("sem6000.refresh.latency_ms")
        .with_description("Time from refresh start to sample delivery in milliseconds")
        .with_unit(Unit::Milliseconds)
        .with_labels(&["device"]);

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Notifications received, by event kind.
    ///
    /// Labels: device, kind (measurement, switch_ack, login_ack, unrecognized)
    pub const NOTIFICATIONS: Metric = Metric::counter("sem6000.notify.received")
        .with_description("Notifications received")
        .with_unit(Unit::Count)
        .with_labels(&["device", "kind"]);

    /// Notifications dropped because they failed to decode.
    ///
    /// Labels: device, reason (invalid_header, truncated, malformed_measurement)
    pub const NOTIFICATIONS_DROPPED: Metric = Metric::counter("sem6000.notify.dropped")
        .with_description("Notifications dropped on decode error")
        .with_unit(Unit::Count)
        .with_labels(&["device", "reason"]);

    /// Measurements that arrived with no refresh waiting for them.
    pub const STALE_SAMPLES: Metric = Metric::counter("sem6000.notify.stale_samples")
        .with_description("Measurements merged into state without a waiting refresh")
        .with_unit(Unit::Count)
        .with_labels(&["device"]);

    // ========================================================================
    // Switching
    // ========================================================================

    /// Switch commands written.
    ///
    /// Labels: device, mode (on, off)
    pub const SWITCH_COMMANDS: Metric = Metric::counter("sem6000.switch.commands")
        .with_description("Switch commands written")
        .with_unit(Unit::Count)
        .with_labels(&["device", "mode"]);

    /// Switch commands issued while an earlier one was unacknowledged.
    pub const SWITCH_DESYNC: Metric = Metric::counter("sem6000.switch.desync")
        .with_description("Switch commands sent with an acknowledgement outstanding")
        .with_unit(Unit::Count)
        .with_labels(&["device"]);

    /// Measure requests issued to resynchronize after an unexpected acknowledgement.
    pub const SWITCH_RESYNC: Metric = Metric::counter("sem6000.switch.resync")
        .with_description("Resynchronizing measure requests")
        .with_unit(Unit::Count)
        .with_labels(&["device"]);

    // ========================================================================
    // Readings
    // ========================================================================

    /// Last reported active power.
    pub const POWER_WATTS: Metric = Metric::gauge("sem6000.reading.power_watts")
        .with_description("Last reported active power in watts")
        .with_labels(&["device"]);

    /// Last reported energy counter.
    pub const ENERGY_KWH: Metric = Metric::gauge("sem6000.reading.energy_kwh")
        .with_description("Last reported energy counter in kilowatt-hours")
        .with_labels(&["device"]);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &SESSION_LOGINS,
        &SESSION_FORCED_DISCONNECTS,
        &REFRESH_TOTAL,
        &REFRESH_FAILED,
        &REFRESH_LATENCY,
        &NOTIFICATIONS,
        &NOTIFICATIONS_DROPPED,
        &STALE_SAMPLES,
        &SWITCH_COMMANDS,
        &SWITCH_DESYNC,
        &SWITCH_RESYNC,
        &POWER_WATTS,
        &ENERGY_KWH,
    ];
}

/// Labels identifying the plug a metric belongs to.
///
/// ```rust
/// use sem6000_metrics::SessionLabels;
///
/// let labels = SessionLabels::new("a4:c1:38:00:11:22");
/// let extended = labels.with(&[("reason", "timeout".to_string())]);
/// assert_eq!(extended.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLabels {
    /// Normalized device address.
    pub device: String,
}

impl SessionLabels {
    /// Creates labels for the given device.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// Converts the labels to `metrics` label pairs.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("device", self.device.clone())]
    }

    /// Returns labels with additional key-value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Describes all session metrics. Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}
