//! Shared helpers for integration tests.

use beacon::PingEvent;
use beacon::config::BeaconConfig;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) const WAIT: Duration = Duration::from_secs(5);

/// Config pointing at `sink_uri`, with the mode store under `dir` and fast
/// monitor polling.
pub(crate) fn fast_config(sink_uri: &str, dir: &Path) -> BeaconConfig {
    let mut config = BeaconConfig::default();
    config.sink.base_url = sink_uri.to_owned();
    config.sink.request_timeout_ms = Some(2_000);
    config.scheduler.monitor_poll_interval_ms = 20;
    config.store.path = Some(dir.join("mode.json"));
    config
}

/// Write the settings-UI mode document.
pub(crate) fn write_mode(dir: &Path, json: serde_json::Value) {
    std::fs::write(dir.join("mode.json"), json.to_string()).expect("write mode store");
}

pub(crate) fn read_mode(dir: &Path) -> serde_json::Value {
    let bytes = std::fs::read(dir.join("mode.json")).expect("read mode store");
    serde_json::from_slice(&bytes).expect("parse mode store")
}

/// Wait for the first event matching `pred`, failing after [`WAIT`].
pub(crate) async fn wait_for(
    events: &mut mpsc::UnboundedReceiver<PingEvent>,
    pred: impl Fn(&PingEvent) -> bool,
) -> PingEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event before timeout")
}
