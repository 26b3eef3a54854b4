//! Mode change detection.
//!
//! [`ModeMonitor`] polls the mode store on a fixed period and tells the ping
//! scheduler to re-arm whenever the tracking mode differs from the last one it
//! saw. It performs no I/O of its own beyond the store read, and nothing
//! happens while the mode is unchanged.
//!
//! The first poll runs immediately, against an "inactive" baseline, so a mode
//! that is already active at startup is picked up without waiting a period.
//!
//! The scheduler may go idle on its own when a cycle reads an inactive mode.
//! If the store is active again by the next poll the monitor re-sends the mode
//! even though it looks unchanged, so an off/on flip between two polls cannot
//! leave tracking stalled.

use crate::config::DEFAULT_MONITOR_POLL_INTERVAL_MS;
use crate::mode::{ModeProvider, TrackingMode};
use crate::scheduler::ping::{PingSchedulerHandle, SchedulerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Polls the mode store and forwards transitions to the scheduler.
pub struct ModeMonitor {
    modes: Arc<dyn ModeProvider>,
    scheduler: PingSchedulerHandle,
    cancel: CancellationToken,
    poll_interval: Duration,
    last_observed: TrackingMode,
}

impl ModeMonitor {
    /// Create a monitor that re-arms `scheduler` on mode transitions.
    ///
    /// Call [`run`](Self::run) to start polling.
    pub fn new(
        modes: Arc<dyn ModeProvider>,
        scheduler: PingSchedulerHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            modes,
            scheduler,
            cancel,
            poll_interval: Duration::from_millis(DEFAULT_MONITOR_POLL_INTERVAL_MS),
            last_observed: TrackingMode::default(),
        }
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn last_observed(&self) -> TrackingMode {
        self.last_observed
    }

    /// Read the store once. Returns the mode to send when it differs from the
    /// last observation, or when it is active while the scheduler sits idle.
    /// Read failures count as "no change".
    pub fn poll_once(&mut self) -> Option<TrackingMode> {
        let mode = match self.modes.snapshot() {
            Ok(snapshot) => snapshot.mode,
            Err(e) => {
                warn!(error = %e, "mode monitor: cannot read tracking mode");
                return None;
            }
        };

        if mode == self.last_observed {
            if mode.is_active() && self.scheduler.state() == SchedulerState::Idle {
                info!(%mode, "scheduler idle while tracking is active");
                return Some(mode);
            }
            return None;
        }

        info!(old = %self.last_observed, new = %mode, "tracking mode transition detected");
        self.last_observed = mode;
        Some(mode)
    }

    /// Run the monitor loop until the cancellation token is cancelled.
    ///
    /// ```rust,ignore
    /// let monitor = ModeMonitor::new(store, handle, cancel.child_token());
    /// tokio::spawn(monitor.run());
    /// ```
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "mode monitor started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("mode monitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(mode) = self.poll_once() else {
                        continue;
                    };
                    if self.scheduler.mode_changed(mode).is_err() {
                        // Scheduler gone: nothing left to re-arm.
                        warn!("mode monitor: scheduler closed, stopping");
                        break;
                    }
                    debug!(%mode, "scheduler re-arm requested");
                }
            }
        }
    }
}
