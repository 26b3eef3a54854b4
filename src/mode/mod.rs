//! Tracking mode model and the provider seams over the mode store.
//!
//! The mode store is owned by the settings UI and the emergency toggle. The
//! core only ever reads it through [`ModeProvider`]; the single value it
//! writes back is the last-ping timestamp, through [`PingLedger`].

pub mod store;

pub use store::{FileModeStore, MemoryModeStore, StoredModeState};

use crate::error::{BeaconError, Result};
use std::time::Duration;

/// Ping interval used when the store holds none (or zero).
pub const DEFAULT_PING_INTERVAL_MS: u64 = 30_000;

/// Which tracking flags are set and how often to ping while any is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingMode {
    pub emergency_active: bool,
    pub voluntary_tracking_active: bool,
    /// Always greater than zero.
    pub ping_interval_ms: u64,
}

impl TrackingMode {
    /// Inactive mode with the given interval (zero is replaced by the default).
    pub fn inactive(ping_interval_ms: u64) -> Self {
        Self {
            emergency_active: false,
            voluntary_tracking_active: false,
            ping_interval_ms: normalize_interval(ping_interval_ms, DEFAULT_PING_INTERVAL_MS),
        }
    }

    /// Returns `true` when either flag requires pings.
    pub fn is_active(&self) -> bool {
        self.emergency_active || self.voluntary_tracking_active
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

impl Default for TrackingMode {
    fn default() -> Self {
        Self::inactive(DEFAULT_PING_INTERVAL_MS)
    }
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match (self.emergency_active, self.voluntary_tracking_active) {
            (true, true) => "emergency+tracking",
            (true, false) => "emergency",
            (false, true) => "tracking",
            (false, false) => "inactive",
        };
        write!(f, "{label} every {} ms", self.ping_interval_ms)
    }
}

/// One consistent read of the mode store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSnapshot {
    pub mode: TrackingMode,
    /// Authenticated user the reports are attributed to, if signed in.
    pub user_id: Option<String>,
}

impl ModeSnapshot {
    /// Returns the user id, or a [`BeaconError::ModeRead`] when nobody is signed in.
    pub fn require_user(&self) -> Result<&str> {
        match self.user_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(BeaconError::ModeRead(
                "no authenticated user in mode store".to_owned(),
            )),
        }
    }
}

/// Read-only view of the mode store.
pub trait ModeProvider: Send + Sync {
    fn snapshot(&self) -> Result<ModeSnapshot>;
}

/// The last-ping record: the only store value written by the core.
pub trait PingLedger: Send + Sync {
    fn last_ping_ms(&self) -> Result<Option<u64>>;

    /// Record a ping attempt. The stored value never moves backwards.
    fn record_ping(&self, at_ms: u64) -> Result<()>;
}

pub(crate) fn normalize_interval(interval_ms: u64, fallback_ms: u64) -> u64 {
    if interval_ms > 0 {
        interval_ms
    } else if fallback_ms > 0 {
        fallback_ms
    } else {
        DEFAULT_PING_INTERVAL_MS
    }
}
