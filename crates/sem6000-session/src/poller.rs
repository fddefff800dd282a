//! Interval-driven refresh loop.
//!
//! The coordinator never decides when to poll. This loop is the scheduler the
//! CLI uses: one refresh per tick, never overlapping, until a cycle budget is
//! spent or shutdown is signalled.

use std::time::Duration;

use sem6000_protocol::DerivedReading;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::coordinator::{RefreshError, SessionCoordinator};
use crate::transport::Transport;

/// Outcome counts of a poll run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Refresh cycles run.
    pub cycles: u64,
    /// Cycles that produced a reading.
    pub succeeded: u64,
    /// Cycles that failed.
    pub failed: u64,
}

/// Periodic refresh driver.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    max_cycles: Option<u64>,
}

impl Poller {
    /// Poll every `interval`, forever.
    pub fn new(interval: Duration) -> Self {
        Poller {
            interval,
            max_cycles: None,
        }
    }

    /// Stop after `cycles` refreshes.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Run until the cycle budget is spent or `shutdown` turns true.
    ///
    /// The first refresh happens immediately. A slow cycle delays the next
    /// tick instead of bunching ticks up. `on_result` sees every outcome.
    pub async fn run<T, F>(
        &self,
        session: &SessionCoordinator<T>,
        mut shutdown: watch::Receiver<bool>,
        mut on_result: F,
    ) -> PollSummary
    where
        T: Transport,
        F: FnMut(&Result<DerivedReading, RefreshError>),
    {
        let mut summary = PollSummary::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() || self.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    // Sender gone counts as shutdown.
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let result = session.refresh().await;
            summary.cycles += 1;
            match &result {
                Ok(_) => summary.succeeded += 1,
                Err(_) => summary.failed += 1,
            }
            on_result(&result);
        }

        debug!(
            device = %session.device(),
            cycles = summary.cycles,
            failed = summary.failed,
            "poll loop stopped"
        );
        summary
    }
}
