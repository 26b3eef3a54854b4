//! Mode store backends.
//!
//! [`FileModeStore`] reads the state from a small JSON document that the
//! settings UI rewrites whenever a toggle changes. The file is re-read on every
//! snapshot, so external edits are picked up on the next monitor tick. The
//! core never writes that document: the last ping time lives in a separate
//! ledger file next to it (`last_ping.json`).
//! [`MemoryModeStore`] is a shared in-process store for embedding hosts and
//! tests.

use crate::error::{BeaconError, Result};
use crate::mode::{
    DEFAULT_PING_INTERVAL_MS, ModeProvider, ModeSnapshot, PingLedger, TrackingMode,
    normalize_interval,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Persisted key/value state shared with the settings UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoredModeState {
    pub emergency_mode: bool,
    pub active_tracking_enabled: bool,
    /// Ping interval in milliseconds; `None` or zero means "use the default".
    #[serde(rename = "pingInterval", skip_serializing_if = "Option::is_none")]
    pub ping_interval_ms: Option<u64>,
    /// Epoch milliseconds of the last ping attempt, if the UI seeded one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ping_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl StoredModeState {
    fn to_snapshot(&self, default_interval_ms: u64) -> ModeSnapshot {
        ModeSnapshot {
            mode: TrackingMode {
                emergency_active: self.emergency_mode,
                voluntary_tracking_active: self.active_tracking_enabled,
                ping_interval_ms: normalize_interval(
                    self.ping_interval_ms.unwrap_or(0),
                    default_interval_ms,
                ),
            },
            user_id: self.user_id.clone(),
        }
    }

    fn advance_last_ping(&mut self, at_ms: u64) {
        self.last_ping_time = Some(advance(self.last_ping_time, at_ms));
    }
}

/// Contents of the last-ping ledger file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LedgerRecord {
    last_ping_time: Option<u64>,
}

fn advance(prev: Option<u64>, at_ms: u64) -> u64 {
    prev.map_or(at_ms, |prev| prev.max(at_ms))
}

const LEDGER_FILE_NAME: &str = "last_ping.json";

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// JSON file mode store.
pub struct FileModeStore {
    path: PathBuf,
    ledger_path: PathBuf,
    default_interval_ms: u64,
    /// Serializes the ledger read-modify-write in [`PingLedger::record_ping`].
    write_lock: Mutex<()>,
}

impl FileModeStore {
    /// Store reading `path`, with the ledger in the same directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ledger_path = path.with_file_name(LEDGER_FILE_NAME);
        Self {
            path,
            ledger_path,
            default_interval_ms: DEFAULT_PING_INTERVAL_MS,
            write_lock: Mutex::new(()),
        }
    }

    /// Interval used when the file holds none.
    pub fn with_default_interval_ms(mut self, interval_ms: u64) -> Self {
        self.default_interval_ms = normalize_interval(interval_ms, DEFAULT_PING_INTERVAL_MS);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Load the raw state. A missing file is the all-inactive default.
    pub fn load(&self) -> Result<StoredModeState> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoredModeState::default());
            }
            Err(e) => {
                return Err(BeaconError::Store(format!(
                    "cannot read mode store {}: {e}",
                    self.path.display()
                )));
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            BeaconError::Store(format!(
                "cannot parse mode store {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Replace the whole mode document. Used by settings tooling, never by
    /// the ping loop.
    pub fn save(&self, state: &StoredModeState) -> Result<()> {
        write_atomic(&self.path, state)
    }

    fn load_ledger(&self) -> Result<LedgerRecord> {
        match std::fs::read(&self.ledger_path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                BeaconError::Store(format!(
                    "cannot parse ping ledger {}: {e}",
                    self.ledger_path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LedgerRecord::default()),
            Err(e) => Err(BeaconError::Store(format!(
                "cannot read ping ledger {}: {e}",
                self.ledger_path.display()
            ))),
        }
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| BeaconError::Store(format!("cannot create store dir: {e}")))?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| BeaconError::Store(format!("cannot serialize {}: {e}", path.display())))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| BeaconError::Store(format!("cannot write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| BeaconError::Store(format!("cannot replace {}: {e}", path.display())))?;
    Ok(())
}

impl ModeProvider for FileModeStore {
    fn snapshot(&self) -> Result<ModeSnapshot> {
        let state = self
            .load()
            .map_err(|e| BeaconError::ModeRead(e.to_string()))?;
        Ok(state.to_snapshot(self.default_interval_ms))
    }
}

impl PingLedger for FileModeStore {
    /// The ledger value, or the UI-seeded `lastPingTime`, whichever is newer.
    fn last_ping_ms(&self) -> Result<Option<u64>> {
        let recorded = self.load_ledger()?.last_ping_time;
        let seeded = self.load()?.last_ping_time;
        Ok(recorded.max(seeded))
    }

    fn record_ping(&self, at_ms: u64) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| BeaconError::Store("ping ledger lock poisoned".to_owned()))?;
        let mut record = self.load_ledger()?;
        record.last_ping_time = Some(advance(record.last_ping_time, at_ms));
        write_atomic(&self.ledger_path, &record)?;
        debug!(at_ms, path = %self.ledger_path.display(), "recorded last ping");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Shared in-process mode store. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryModeStore {
    inner: Arc<Mutex<StoredModeState>>,
}

impl MemoryModeStore {
    pub fn new(state: StoredModeState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state.
    pub fn state(&self) -> StoredModeState {
        self.with_state(|s| s.clone())
    }

    pub fn set_emergency(&self, active: bool) {
        self.with_state(|s| s.emergency_mode = active);
    }

    pub fn set_tracking(&self, active: bool) {
        self.with_state(|s| s.active_tracking_enabled = active);
    }

    pub fn set_ping_interval_ms(&self, interval_ms: u64) {
        self.with_state(|s| s.ping_interval_ms = Some(interval_ms));
    }

    pub fn set_user(&self, user_id: Option<&str>) {
        self.with_state(|s| s.user_id = user_id.map(str::to_owned));
    }

    pub fn set_last_ping(&self, at_ms: Option<u64>) {
        self.with_state(|s| s.last_ping_time = at_ms);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut StoredModeState) -> R) -> R {
        // A panic while holding the lock cannot leave the plain-data state
        // half-written, so recover the guard.
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl ModeProvider for MemoryModeStore {
    fn snapshot(&self) -> Result<ModeSnapshot> {
        Ok(self.with_state(|s| s.to_snapshot(DEFAULT_PING_INTERVAL_MS)))
    }
}

impl PingLedger for MemoryModeStore {
    fn last_ping_ms(&self) -> Result<Option<u64>> {
        Ok(self.with_state(|s| s.last_ping_time))
    }

    fn record_ping(&self, at_ms: u64) -> Result<()> {
        self.with_state(|s| s.advance_last_ping(at_ms));
        Ok(())
    }
}
