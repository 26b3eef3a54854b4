//! Background ping scheduling.
//!
//! The [`PingScheduler`] owns the one timer that drives sample → report →
//! reschedule cycles; the [`ModeMonitor`] polls the mode store and asks the
//! scheduler to re-arm on transitions.

pub mod monitor;
pub mod ping;
pub mod wake;

pub use monitor::ModeMonitor;
pub use ping::{
    PingEvent, PingScheduler, PingSchedulerHandle, SchedulerCommand, SchedulerState,
    catch_up_delay,
};
pub use wake::NextWake;
