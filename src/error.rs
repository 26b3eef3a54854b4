//! Error types for the location-ping core.

/// Top-level error type for the beacon crate.
#[derive(Debug, thiserror::Error)]
pub enum BeaconError {
    /// The device denied or failed to produce a position.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// Network or endpoint error while sending a report.
    #[error("reporting error: {0}")]
    Reporting(String),

    /// The tracking mode (or the authenticated user) could not be read.
    #[error("mode read error: {0}")]
    ModeRead(String),

    /// Mode store persistence error.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BeaconError>;
