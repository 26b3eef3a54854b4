//! Ping scheduler.
//!
//! A single tokio task owns the [`NextWake`] timer and runs cycles inline, so
//! a cycle (sample, report, reschedule) can never overlap another one and
//! commands that arrive mid-cycle are handled once it completes.
//!
//! ```text
//!            ModeChanged(active)           timer fires
//!   Idle ─────────────────────────▶ Armed ────────────▶ Firing
//!    ▲  ◀──── ModeChanged(inactive) ─┘  ▲                 │
//!    │                                  └── still active ─┤
//!    └────────────────────────────────────── inactive ────┘
//! ```

use crate::clock::Clock;
use crate::error::{BeaconError, Result};
use crate::mode::{ModeProvider, PingLedger, TrackingMode};
use crate::reporter::{Destination, LocationReporter, Report};
use crate::sampler::PositionSampler;
use crate::scheduler::wake::NextWake;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No mode active, no timer.
    Idle,
    /// Timer counting down.
    Armed,
    /// Executing a cycle.
    Firing,
}

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// The tracking mode changed: clear the timer and re-arm with catch-up.
    ModeChanged(TrackingMode),
}

/// Observable outcome of scheduler activity.
#[derive(Debug, Clone, PartialEq)]
pub enum PingEvent {
    /// A timer was armed (replacing any previous one).
    Armed { delay: Duration, mode: TrackingMode },
    /// No mode active; timer cleared.
    Idle,
    /// The sink acknowledged a report.
    Reported {
        destination: Destination,
        status: String,
    },
    /// The device produced no usable position.
    SamplingFailed { error: String },
    /// The sink call failed.
    ReportFailed {
        destination: Destination,
        error: String,
    },
    /// The mode or authenticated user could not be read.
    ModeReadFailed { error: String },
    /// The scheduler loop exited.
    Stopped,
}

/// Wait before the next ping given the time already elapsed since the last.
///
/// With no recorded ping the full interval is used. Once the elapsed time
/// reaches the interval the delay is zero.
pub fn catch_up_delay(interval_ms: u64, last_ping_ms: Option<u64>, now_ms: u64) -> Duration {
    let Some(last) = last_ping_ms else {
        return Duration::from_millis(interval_ms);
    };
    let elapsed = now_ms.saturating_sub(last);
    Duration::from_millis(interval_ms.saturating_sub(elapsed))
}

/// Cloneable sender side used by the mode monitor and embedding hosts.
#[derive(Debug, Clone)]
pub struct PingSchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
    state: watch::Receiver<SchedulerState>,
}

impl PingSchedulerHandle {
    /// Ask the scheduler to re-arm for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Channel`] once the scheduler has stopped.
    pub fn mode_changed(&self, mode: TrackingMode) -> Result<()> {
        self.tx
            .send(SchedulerCommand::ModeChanged(mode))
            .map_err(|_| BeaconError::Channel("ping scheduler is not running".to_owned()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Last state published by the scheduler.
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Handle wired to bare channels instead of a running scheduler.
    #[cfg(test)]
    pub(crate) fn detached(
        initial: SchedulerState,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<SchedulerCommand>,
        watch::Sender<SchedulerState>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(initial);
        (Self { tx, state }, rx, state_tx)
    }
}

/// Drives sample → report → reschedule cycles from a single owned timer.
pub struct PingScheduler {
    modes: Arc<dyn ModeProvider>,
    ledger: Arc<dyn PingLedger>,
    sampler: PositionSampler,
    reporter: LocationReporter,
    clock: Arc<dyn Clock>,
    wake: NextWake,
    state: SchedulerState,
    state_tx: watch::Sender<SchedulerState>,
    /// Last mode seen, from a command or a cycle read.
    current: TrackingMode,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    events: Option<mpsc::UnboundedSender<PingEvent>>,
    cancel: CancellationToken,
}

impl PingScheduler {
    /// Create an idle scheduler and the handle that drives it.
    pub fn new(
        modes: Arc<dyn ModeProvider>,
        ledger: Arc<dyn PingLedger>,
        sampler: PositionSampler,
        reporter: LocationReporter,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> (Self, PingSchedulerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SchedulerState::Idle);
        let scheduler = Self {
            modes,
            ledger,
            sampler,
            reporter,
            clock,
            wake: NextWake::new(),
            state: SchedulerState::Idle,
            state_tx,
            current: TrackingMode::default(),
            commands: rx,
            events: None,
            cancel,
        };
        (scheduler, PingSchedulerHandle { tx, state })
    }

    /// Publish [`PingEvent`]s on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<PingEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Interval assumed until the first mode is observed.
    pub fn with_default_interval_ms(mut self, interval_ms: u64) -> Self {
        self.current = TrackingMode::inactive(interval_ms);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of outstanding timers (0 or 1).
    pub fn outstanding_timers(&self) -> usize {
        self.wake.outstanding()
    }

    /// Run until the cancellation token fires.
    ///
    /// Intended to be spawned:
    ///
    /// ```rust,ignore
    /// let (scheduler, handle) = PingScheduler::new(/* ... */);
    /// tokio::spawn(scheduler.run());
    /// ```
    pub async fn run(mut self) {
        info!("ping scheduler started");
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.commands.recv(), if commands_open => match cmd {
                    Some(SchedulerCommand::ModeChanged(mode)) => self.on_mode_changed(mode),
                    None => {
                        debug!("ping scheduler command channel closed");
                        commands_open = false;
                    }
                },
                _ = self.wake.fired() => {
                    let cancel = self.cancel.clone();
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.fire() => {}
                    }
                }
            }
        }

        self.wake.clear();
        self.set_state(SchedulerState::Idle);
        self.emit(PingEvent::Stopped);
        info!("ping scheduler stopped");
    }

    /// Clear the timer and re-arm for `mode` using the catch-up rule.
    fn on_mode_changed(&mut self, mode: TrackingMode) {
        info!(%mode, "tracking mode changed");
        self.current = mode;
        self.wake.clear();

        if mode.is_active() {
            let delay = self.catch_up_for(&mode);
            self.arm(delay, mode);
        } else {
            self.go_idle();
        }
    }

    /// One cycle. Every path ends Armed or Idle.
    async fn fire(&mut self) {
        self.set_state(SchedulerState::Firing);

        let snapshot = match self.modes.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => return self.skip_cycle(e),
        };
        self.current = snapshot.mode;

        if !snapshot.mode.is_active() {
            debug!("no ping: tracking inactive");
            return self.go_idle();
        }

        let user_id = match snapshot.require_user() {
            Ok(user_id) => user_id.to_owned(),
            Err(e) => return self.skip_cycle(e),
        };
        let mode = snapshot.mode;

        match self.sampler.sample().await {
            Ok(sample) => {
                let report = Report::new(sample, mode, user_id);
                match self.reporter.send(&report).await {
                    Ok(ack) => self.emit(PingEvent::Reported {
                        destination: report.destination,
                        status: ack.status,
                    }),
                    Err(e) => self.emit(PingEvent::ReportFailed {
                        destination: report.destination,
                        error: e.to_string(),
                    }),
                }
            }
            Err(e) => {
                warn!(error = %e, "position sampling failed");
                self.reporter.record_attempt();
                self.emit(PingEvent::SamplingFailed {
                    error: e.to_string(),
                });
            }
        }

        self.rearm_after_cycle(mode);
    }

    /// Mode read failure: no ping this cycle, try again one interval later.
    fn skip_cycle(&mut self, err: BeaconError) {
        warn!(error = %err, "skipping ping: cannot read tracking mode");
        self.emit(PingEvent::ModeReadFailed {
            error: err.to_string(),
        });
        let mode = self.current;
        self.arm(mode.ping_interval(), mode);
    }

    fn rearm_after_cycle(&mut self, cycle_mode: TrackingMode) {
        match self.modes.snapshot() {
            Ok(snapshot) if snapshot.mode.is_active() => {
                self.current = snapshot.mode;
                let delay = self.catch_up_for(&snapshot.mode);
                self.arm(delay, snapshot.mode);
            }
            Ok(snapshot) => {
                self.current = snapshot.mode;
                self.go_idle();
            }
            Err(e) => {
                warn!(error = %e, "cannot re-read tracking mode; keeping previous interval");
                self.arm(cycle_mode.ping_interval(), cycle_mode);
            }
        }
    }

    fn catch_up_for(&self, mode: &TrackingMode) -> Duration {
        let last = self.ledger.last_ping_ms().unwrap_or_else(|e| {
            warn!(error = %e, "cannot read last ping time; waiting a full interval");
            None
        });
        catch_up_delay(mode.ping_interval_ms, last, self.clock.now_ms())
    }

    fn arm(&mut self, delay: Duration, mode: TrackingMode) {
        self.wake.arm(delay);
        self.set_state(SchedulerState::Armed);
        info!(delay_ms = delay.as_millis() as u64, %mode, "next ping scheduled");
        self.emit(PingEvent::Armed { delay, mode });
    }

    fn go_idle(&mut self) {
        self.wake.clear();
        self.set_state(SchedulerState::Idle);
        info!("no tracking active; scheduler idle");
        self.emit(PingEvent::Idle);
    }

    fn set_state(&mut self, state: SchedulerState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: PingEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is not an error.
            let _ = tx.send(event);
        }
    }
}
