//! Location reporter and the location sink client.
//!
//! A [`Report`] pairs one [`PositionSample`] with the mode it was taken under.
//! The destination is fixed when the report is built, so a mode flip while the
//! request is in flight only affects the next cycle.

use crate::clock::Clock;
use crate::config::SinkConfig;
use crate::error::{BeaconError, Result};
use crate::mode::{PingLedger, TrackingMode};
use crate::sampler::PositionSample;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which sink endpoint a report goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Periodic voluntary-tracking ping.
    Regular,
    /// Ping sent while an emergency is active.
    Emergency,
}

impl Destination {
    pub fn for_mode(mode: &TrackingMode) -> Self {
        if mode.emergency_active {
            Self::Emergency
        } else {
            Self::Regular
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One report, built and sent within a single cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub sample: PositionSample,
    pub mode: TrackingMode,
    pub destination: Destination,
    pub user_id: String,
}

impl Report {
    pub fn new(sample: PositionSample, mode: TrackingMode, user_id: impl Into<String>) -> Self {
        Self {
            sample,
            mode,
            destination: Destination::for_mode(&mode),
            user_id: user_id.into(),
        }
    }

    /// Wire body accepted by both sink endpoints.
    pub fn payload(&self) -> PingPayload {
        PingPayload {
            latitude: self.sample.latitude,
            longitude: self.sample.longitude,
            accuracy: self.sample.accuracy_meters,
            user_id: self.user_id.clone(),
            is_emergency: self.mode.emergency_active,
        }
    }
}

/// JSON body POSTed to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters.
    pub accuracy: f64,
    pub user_id: String,
    pub is_emergency: bool,
}

/// Acknowledgement returned by the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkAck {
    pub status: String,
    pub stored_record: Option<serde_json::Value>,
}

/// External service that persists reported points.
#[async_trait]
pub trait LocationSink: Send + Sync {
    async fn submit(&self, destination: Destination, payload: &PingPayload) -> Result<SinkAck>;
}

// ---------------------------------------------------------------------------
// HTTP sink
// ---------------------------------------------------------------------------

/// Sink reached over HTTP: JSON POST to one of two endpoint URLs.
#[derive(Clone)]
pub struct HttpLocationSink {
    client: reqwest::Client,
    regular_url: url::Url,
    emergency_url: url::Url,
}

impl HttpLocationSink {
    /// Build a sink from config.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Config`] if the base URL or paths do not form
    /// valid URLs, or the HTTP client cannot be built.
    pub fn new(config: &SinkConfig) -> Result<Self> {
        url::Url::parse(&config.base_url)
            .map_err(|e| BeaconError::Config(format!("invalid sink base url: {e}")))?;
        let regular_url = endpoint_url(&config.base_url, &config.regular_path)?;
        let emergency_url = endpoint_url(&config.base_url, &config.emergency_path)?;

        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder
            .build()
            .map_err(|e| BeaconError::Config(format!("cannot build http client: {e}")))?;

        Ok(Self {
            client,
            regular_url,
            emergency_url,
        })
    }

    pub fn endpoint(&self, destination: Destination) -> &url::Url {
        match destination {
            Destination::Regular => &self.regular_url,
            Destination::Emergency => &self.emergency_url,
        }
    }
}

/// Append `path` to the base URL, keeping any path prefix the base carries.
fn endpoint_url(base_url: &str, path: &str) -> Result<url::Url> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url::Url::parse(&joined)
        .map_err(|e| BeaconError::Config(format!("invalid sink endpoint '{joined}': {e}")))
}

#[async_trait]
impl LocationSink for HttpLocationSink {
    async fn submit(&self, destination: Destination, payload: &PingPayload) -> Result<SinkAck> {
        let url = self.endpoint(destination).clone();
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| BeaconError::Reporting(format!("{destination} ping request failed: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            BeaconError::Reporting(format!("{destination} ping response unreadable: {e}"))
        })?;

        if !status.is_success() {
            return Err(BeaconError::Reporting(format!(
                "{destination} endpoint returned {status}: {}",
                truncate(&body, 200)
            )));
        }

        parse_ack(&body)
    }
}

/// Parse either `{status, data}` or `{success, location}` acknowledgements.
pub(crate) fn parse_ack(body: &str) -> Result<SinkAck> {
    if body.trim().is_empty() {
        return Ok(SinkAck {
            status: "success".to_owned(),
            stored_record: None,
        });
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| BeaconError::Reporting(format!("invalid acknowledgement json: {e}")))?;

    let status = match (
        value.get("status").and_then(serde_json::Value::as_str),
        value.get("success").and_then(serde_json::Value::as_bool),
    ) {
        (Some(status), _) => status.to_owned(),
        (None, Some(true)) => "success".to_owned(),
        (None, Some(false)) => "error".to_owned(),
        (None, None) => "unknown".to_owned(),
    };

    if status == "error" {
        let detail = value
            .get("error")
            .map(serde_json::Value::to_string)
            .unwrap_or_else(|| "no detail".to_owned());
        return Err(BeaconError::Reporting(format!("sink rejected ping: {detail}")));
    }

    let stored_record = value
        .get("data")
        .or_else(|| value.get("location"))
        .filter(|v| !v.is_null())
        .cloned();

    Ok(SinkAck {
        status,
        stored_record,
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Sends reports and keeps the last-ping record current.
pub struct LocationReporter {
    sink: Arc<dyn LocationSink>,
    ledger: Arc<dyn PingLedger>,
    clock: Arc<dyn Clock>,
}

impl LocationReporter {
    pub fn new(
        sink: Arc<dyn LocationSink>,
        ledger: Arc<dyn PingLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            ledger,
            clock,
        }
    }

    /// Send one report with exactly one sink call.
    ///
    /// The last-ping timestamp is updated whatever the outcome, so a failing
    /// endpoint is retried on the normal cadence rather than immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Reporting`] when the sink call fails.
    pub async fn send(&self, report: &Report) -> Result<SinkAck> {
        let payload = report.payload();
        let outcome = self.sink.submit(report.destination, &payload).await;
        self.record_attempt();

        match &outcome {
            Ok(ack) => {
                info!(
                    destination = %report.destination,
                    status = %ack.status,
                    at = %chrono::Local::now().format("%H:%M:%S"),
                    "ping sent"
                );
            }
            Err(e) => {
                warn!(destination = %report.destination, error = %e, "ping failed");
            }
        }

        outcome.map_err(|e| match e {
            BeaconError::Reporting(_) => e,
            other => BeaconError::Reporting(other.to_string()),
        })
    }

    /// Stamp the last-ping record with the current time.
    pub fn record_attempt(&self) {
        let now = self.clock.now_ms();
        if let Err(e) = self.ledger.record_ping(now) {
            warn!(error = %e, "cannot record last ping time");
        } else {
            debug!(at_ms = now, "last ping time updated");
        }
    }
}
