//! Tracker: the component that owns the ping scheduler and mode monitor.
//!
//! [`Tracker::start`] spawns both loops under one cancellation token and
//! returns a [`TrackerHandle`]; [`TrackerHandle::shutdown`] cancels the token,
//! which clears both timers, and waits for the tasks to exit.

use crate::clock::{Clock, SystemClock};
use crate::config::{BeaconConfig, DEFAULT_MONITOR_POLL_INTERVAL_MS};
use crate::error::{BeaconError, Result};
use crate::mode::{DEFAULT_PING_INTERVAL_MS, FileModeStore, ModeProvider, PingLedger, TrackingMode};
use crate::reporter::{HttpLocationSink, LocationReporter, LocationSink};
use crate::sampler::{AccuracyHint, LocationSource, PositionSampler};
use crate::scheduler::{ModeMonitor, PingEvent, PingScheduler, PingSchedulerHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wiring for one tracking session.
pub struct Tracker {
    modes: Arc<dyn ModeProvider>,
    ledger: Arc<dyn PingLedger>,
    source: Arc<dyn LocationSource>,
    sink: Arc<dyn LocationSink>,
    clock: Arc<dyn Clock>,
    accuracy: AccuracyHint,
    sample_timeout: Option<Duration>,
    default_interval_ms: u64,
    monitor_poll_interval: Duration,
}

impl Tracker {
    pub fn new(
        modes: Arc<dyn ModeProvider>,
        ledger: Arc<dyn PingLedger>,
        source: Arc<dyn LocationSource>,
        sink: Arc<dyn LocationSink>,
    ) -> Self {
        Self {
            modes,
            ledger,
            source,
            sink,
            clock: Arc::new(SystemClock),
            accuracy: AccuracyHint::High,
            sample_timeout: None,
            default_interval_ms: DEFAULT_PING_INTERVAL_MS,
            monitor_poll_interval: Duration::from_millis(DEFAULT_MONITOR_POLL_INTERVAL_MS),
        }
    }

    /// Build a tracker over the file mode store and HTTP sink named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Config`] if the config is invalid or the sink
    /// cannot be built.
    pub fn from_config(config: &BeaconConfig, source: Arc<dyn LocationSource>) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(
            FileModeStore::new(config.store.effective_path())
                .with_default_interval_ms(config.scheduler.default_ping_interval_ms),
        );
        let sink = Arc::new(HttpLocationSink::new(&config.sink)?);
        info!(store = %store.path().display(), sink = %config.sink.base_url, "tracker configured");

        Ok(Self::new(store.clone(), store, source, sink)
            .with_accuracy(config.sampler.accuracy)
            .with_sample_timeout(config.sampler.timeout())
            .with_default_interval_ms(config.scheduler.default_ping_interval_ms)
            .with_monitor_poll_interval(config.scheduler.monitor_poll_interval()))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_accuracy(mut self, accuracy: AccuracyHint) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_sample_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sample_timeout = timeout;
        self
    }

    pub fn with_default_interval_ms(mut self, interval_ms: u64) -> Self {
        self.default_interval_ms = interval_ms;
        self
    }

    pub fn with_monitor_poll_interval(mut self, interval: Duration) -> Self {
        self.monitor_poll_interval = interval;
        self
    }

    /// Spawn the scheduler and monitor. Must be called inside a tokio runtime.
    pub fn start(self) -> TrackerHandle {
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let sampler = PositionSampler::new(self.source, self.clock.clone())
            .with_accuracy(self.accuracy)
            .with_timeout(self.sample_timeout);
        let reporter = LocationReporter::new(self.sink, self.ledger.clone(), self.clock.clone());
        let (scheduler, handle) = PingScheduler::new(
            self.modes.clone(),
            self.ledger,
            sampler,
            reporter,
            self.clock,
            cancel.child_token(),
        );
        let scheduler = scheduler
            .with_default_interval_ms(self.default_interval_ms)
            .with_events(events_tx);

        let monitor = ModeMonitor::new(self.modes, handle.clone(), cancel.child_token())
            .with_poll_interval(self.monitor_poll_interval);

        let scheduler_task = tokio::spawn(scheduler.run());
        let monitor_task = tokio::spawn(monitor.run());
        info!("tracker started");

        TrackerHandle {
            cancel,
            scheduler: handle,
            events: Some(events_rx),
            scheduler_task,
            monitor_task,
        }
    }
}

/// Running tracker.
pub struct TrackerHandle {
    cancel: CancellationToken,
    scheduler: PingSchedulerHandle,
    events: Option<mpsc::UnboundedReceiver<PingEvent>>,
    scheduler_task: JoinHandle<()>,
    monitor_task: JoinHandle<()>,
}

impl TrackerHandle {
    /// Re-arm immediately after a mode change made by this process, instead
    /// of waiting for the next monitor poll.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Channel`] if the scheduler has stopped.
    pub fn notify_mode_changed(&self, mode: TrackingMode) -> Result<()> {
        self.scheduler.mode_changed(mode)
    }

    /// Take the scheduler event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<PingEvent>> {
        self.events.take()
    }

    pub fn is_running(&self) -> bool {
        !self.scheduler_task.is_finished() && !self.monitor_task.is_finished()
    }

    /// Stop both loops and wait for them to exit.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Channel`] if either task panicked.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        let scheduler = self.scheduler_task.await;
        let monitor = self.monitor_task.await;
        scheduler.map_err(|e| BeaconError::Channel(format!("ping scheduler task failed: {e}")))?;
        monitor.map_err(|e| BeaconError::Channel(format!("mode monitor task failed: {e}")))?;
        info!("tracker shut down");
        Ok(())
    }
}
