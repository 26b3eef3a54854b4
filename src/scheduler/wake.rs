//! The scheduler's single timer.
//!
//! [`NextWake`] holds at most one pending deadline. Arming drops whatever was
//! there before, and the type is neither `Clone` nor `Copy`, so one scheduler
//! can never have two timers outstanding.

use std::pin::Pin;
use std::time::Duration;
use tokio::time::Sleep;

/// Owned handle for the next scheduled fire.
#[derive(Debug, Default)]
pub struct NextWake {
    pending: Option<Pin<Box<Sleep>>>,
    armed_delay: Option<Duration>,
}

impl NextWake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any pending timer with one that fires after `delay`.
    pub fn arm(&mut self, delay: Duration) {
        self.pending = Some(Box::pin(tokio::time::sleep(delay)));
        self.armed_delay = Some(delay);
    }

    /// Drop the pending timer, if any.
    pub fn clear(&mut self) {
        self.pending = None;
        self.armed_delay = None;
    }

    /// Number of outstanding timers: always 0 or 1.
    pub fn outstanding(&self) -> usize {
        usize::from(self.pending.is_some())
    }

    /// Delay the current timer was armed with.
    pub fn armed_delay(&self) -> Option<Duration> {
        self.armed_delay
    }

    /// Wait for the pending timer, then disarm.
    ///
    /// Never resolves while nothing is armed, which makes it safe to poll in a
    /// `select!` loop. Cancel-safe: dropping the future keeps the timer.
    pub async fn fired(&mut self) {
        match self.pending.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.clear();
            }
            None => std::future::pending::<()>().await,
        }
    }
}
