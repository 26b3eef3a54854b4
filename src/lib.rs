//! Beacon: adaptive background location pings.
//!
//! Decides when to sample the device position and send it to a reporting
//! endpoint: promptly while an emergency is active, periodically while
//! voluntary tracking is on, and not at all otherwise.
//!
//! # Architecture
//!
//! - **Mode store** ([`mode`]): externally owned tracking flags and interval,
//!   read through [`mode::ModeProvider`]
//! - **Position sampler** ([`sampler`]): single-shot device location request
//! - **Location reporter** ([`reporter`]): sends one report per cycle to the
//!   regular or emergency endpoint
//! - **Ping scheduler** ([`scheduler::PingScheduler`]): owns the single timer
//!   and runs sample → report → reschedule cycles
//! - **Mode monitor** ([`scheduler::ModeMonitor`]): polls the store and
//!   re-arms the scheduler on transitions
//!
//! [`tracker::Tracker`] wires these together and owns their lifetime.

pub mod beacon_dirs;
pub mod clock;
pub mod config;
pub mod error;
pub mod mode;
pub mod reporter;
pub mod sampler;
pub mod scheduler;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::BeaconConfig;
pub use error::{BeaconError, Result};
pub use mode::{ModeProvider, ModeSnapshot, PingLedger, TrackingMode};
pub use reporter::{Destination, LocationSink, Report};
pub use sampler::{LocationSource, PositionSample};
pub use scheduler::{PingEvent, PingScheduler};
pub use tracker::{Tracker, TrackerHandle};
