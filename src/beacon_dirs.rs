//! Application directory paths for the beacon agent.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/beacon/` | `~/.local/share/beacon/` |
//! | Config | `~/Library/Application Support/beacon/` | `~/.config/beacon/` |
//!
//! Overrides for tests and custom deployments:
//! - `BEACON_DATA_DIR` overrides [`data_dir`]
//! - `BEACON_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("BEACON_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("beacon"))
        .unwrap_or_else(|| PathBuf::from("/tmp/beacon-data"))
}

/// Application config directory.
///
/// Holds `config.toml` and the mode store file `mode.json`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("BEACON_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("beacon"))
        .unwrap_or_else(|| PathBuf::from("/tmp/beacon-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Mode store file path (`config_dir()/mode.json`).
#[must_use]
pub fn mode_store_file() -> PathBuf {
    config_dir().join("mode.json")
}
