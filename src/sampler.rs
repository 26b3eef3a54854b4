//! Position sampler.
//!
//! Wraps a device [`LocationSource`] as a single-shot request per cycle. Any
//! failure (device error, invalid fix, timeout) comes back as
//! [`BeaconError::Sampling`] so the scheduler can log it and keep its cadence.

use crate::clock::Clock;
use crate::config::FixedPosition;
use crate::error::{BeaconError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Accuracy requested from the location source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyHint {
    /// Best available fix (GPS), at higher power cost.
    #[default]
    High,
    /// Coarser network-assisted fix.
    Balanced,
}

/// Raw fix returned by a location source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
}

/// A validated fix stamped with its capture time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    /// Epoch milliseconds at which the fix was returned.
    pub captured_at_ms: u64,
}

/// Device location primitive.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Request one position fix.
    async fn current_position(&self, hint: AccuracyHint) -> Result<PositionFix>;
}

/// Source that always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct StaticLocationSource {
    fix: PositionFix,
}

impl StaticLocationSource {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self {
            fix: PositionFix {
                latitude,
                longitude,
                accuracy_meters,
            },
        }
    }
}

impl From<FixedPosition> for StaticLocationSource {
    fn from(fixed: FixedPosition) -> Self {
        Self::new(fixed.latitude, fixed.longitude, fixed.accuracy_meters)
    }
}

#[async_trait]
impl LocationSource for StaticLocationSource {
    async fn current_position(&self, _hint: AccuracyHint) -> Result<PositionFix> {
        Ok(self.fix)
    }
}

/// Source for hosts with no location device: every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLocationSource;

#[async_trait]
impl LocationSource for UnavailableLocationSource {
    async fn current_position(&self, _hint: AccuracyHint) -> Result<PositionFix> {
        Err(BeaconError::Sampling(
            "no location device configured".to_owned(),
        ))
    }
}

/// Single-shot sampler over a [`LocationSource`].
pub struct PositionSampler {
    source: Arc<dyn LocationSource>,
    clock: Arc<dyn Clock>,
    hint: AccuracyHint,
    timeout: Option<Duration>,
}

impl PositionSampler {
    pub fn new(source: Arc<dyn LocationSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            hint: AccuracyHint::High,
            timeout: None,
        }
    }

    pub fn with_accuracy(mut self, hint: AccuracyHint) -> Self {
        self.hint = hint;
        self
    }

    /// Bound each request. Without a timeout a stalled device request holds
    /// the cycle open until it answers or the scheduler is cancelled.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take one sample.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::Sampling`] when the source fails, times out, or
    /// produces coordinates outside the valid range.
    pub async fn sample(&self) -> Result<PositionSample> {
        let request = self.source.current_position(self.hint);
        let fix = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request).await.map_err(|_| {
                BeaconError::Sampling(format!(
                    "location request timed out after {} ms",
                    limit.as_millis()
                ))
            })?,
            None => request.await,
        }
        .map_err(into_sampling_error)?;

        validate_fix(&fix)?;

        let sample = PositionSample {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy_meters: fix.accuracy_meters,
            captured_at_ms: self.clock.now_ms(),
        };
        debug!(
            latitude = sample.latitude,
            longitude = sample.longitude,
            accuracy_m = sample.accuracy_meters,
            "position sampled"
        );
        Ok(sample)
    }
}

fn into_sampling_error(err: BeaconError) -> BeaconError {
    match err {
        BeaconError::Sampling(_) => err,
        other => BeaconError::Sampling(other.to_string()),
    }
}

fn validate_fix(fix: &PositionFix) -> Result<()> {
    if !fix.latitude.is_finite() || !(-90.0..=90.0).contains(&fix.latitude) {
        return Err(BeaconError::Sampling(format!(
            "latitude out of range: {}",
            fix.latitude
        )));
    }
    if !fix.longitude.is_finite() || !(-180.0..=180.0).contains(&fix.longitude) {
        return Err(BeaconError::Sampling(format!(
            "longitude out of range: {}",
            fix.longitude
        )));
    }
    if !fix.accuracy_meters.is_finite() || fix.accuracy_meters < 0.0 {
        return Err(BeaconError::Sampling(format!(
            "invalid accuracy: {}",
            fix.accuracy_meters
        )));
    }
    Ok(())
}
