//! Configuration types for the beacon agent.

use crate::error::{BeaconError, Result};
use crate::mode::DEFAULT_PING_INTERVAL_MS;
use crate::sampler::AccuracyHint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Mode monitor poll period in milliseconds.
pub const DEFAULT_MONITOR_POLL_INTERVAL_MS: u64 = 5_000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Location sink endpoints.
    pub sink: SinkConfig,
    /// Ping scheduler and mode monitor timing.
    pub scheduler: SchedulerConfig,
    /// Position sampler settings.
    pub sampler: SamplerConfig,
    /// Mode store location.
    pub store: StoreConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Location sink (reporting endpoint) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Base URL the endpoint paths are appended to; a path prefix is kept.
    pub base_url: String,
    /// Path of the regular ping endpoint.
    pub regular_path: String,
    /// Path of the emergency ping endpoint.
    pub emergency_path: String,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub request_timeout_ms: Option<u64>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_owned(),
            regular_path: "/api/locations".to_owned(),
            emergency_path: "/api/alerts".to_owned(),
            request_timeout_ms: None,
        }
    }
}

/// Scheduler timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval used when the mode store holds none.
    pub default_ping_interval_ms: u64,
    /// How often the mode monitor polls the store for transitions.
    pub monitor_poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            monitor_poll_interval_ms: DEFAULT_MONITOR_POLL_INTERVAL_MS,
        }
    }
}

impl SchedulerConfig {
    pub fn monitor_poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_poll_interval_ms)
    }
}

/// Position sampler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Upper bound on one location request.
    ///
    /// `None` waits for the device indefinitely, which lets a stalled request
    /// hold back the next scheduling decision.
    pub timeout_ms: Option<u64>,
    /// Accuracy hint passed to the location source.
    pub accuracy: AccuracyHint,
    /// Static position for hosts without a location device.
    pub fixed: Option<FixedPosition>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            accuracy: AccuracyHint::High,
            fixed: None,
        }
    }
}

impl SamplerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// A fixed position reported on every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPosition {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "default_fixed_accuracy")]
    pub accuracy_meters: f64,
}

fn default_fixed_accuracy() -> f64 {
    10.0
}

/// Mode store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Mode store file. `None` uses `<config dir>/mode.json`.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn effective_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::beacon_dirs::mode_store_file)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a daily-rolling log file in addition to stderr.
    pub to_file: bool,
    /// Log file directory. `None` uses `<data dir>/logs`.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            to_file: true,
            file_dir: None,
        }
    }
}

impl LoggingConfig {
    /// Directory for the log file, or `None` when file logging is off.
    pub fn effective_file_dir(&self) -> Option<PathBuf> {
        if !self.to_file {
            return None;
        }
        Some(
            self.file_dir
                .clone()
                .unwrap_or_else(crate::beacon_dirs::logs_dir),
        )
    }
}

impl BeaconConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| BeaconError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BeaconError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::beacon_dirs::config_file()
    }

    /// Reject values the scheduler cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.default_ping_interval_ms == 0 {
            return Err(BeaconError::Config(
                "scheduler.default_ping_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.scheduler.monitor_poll_interval_ms == 0 {
            return Err(BeaconError::Config(
                "scheduler.monitor_poll_interval_ms must be greater than zero".to_owned(),
            ));
        }
        if self.sampler.timeout_ms == Some(0) {
            return Err(BeaconError::Config(
                "sampler.timeout_ms must be greater than zero when set".to_owned(),
            ));
        }
        if self.sink.request_timeout_ms == Some(0) {
            return Err(BeaconError::Config(
                "sink.request_timeout_ms must be greater than zero when set".to_owned(),
            ));
        }
        url::Url::parse(&self.sink.base_url).map_err(|e| {
            BeaconError::Config(format!("invalid sink.base_url '{}': {e}", self.sink.base_url))
        })?;
        Ok(())
    }
}
