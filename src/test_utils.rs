//! Shared fakes for the scheduler, monitor and tracker unit tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::error::{BeaconError, Result};
use crate::reporter::{Destination, LocationSink, PingPayload, SinkAck};
use crate::sampler::{AccuracyHint, LocationSource, PositionFix};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Location source that replays scripted outcomes, then a default fix.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<PositionFix>>>,
}

impl ScriptedSource {
    pub fn failing_once() -> Self {
        let source = Self::default();
        source.push(Err(BeaconError::Sampling("permission denied".to_owned())));
        source
    }

    pub fn push(&self, outcome: Result<PositionFix>) {
        self.script.lock().unwrap().push_back(outcome);
    }
}

#[async_trait]
impl LocationSource for ScriptedSource {
    async fn current_position(&self, _hint: AccuracyHint) -> Result<PositionFix> {
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(PositionFix {
            latitude: 48.85,
            longitude: 2.35,
            accuracy_meters: 12.0,
        }))
    }
}

/// Sink that records every call and can fail or hold requests open.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<(Destination, PingPayload)>>,
    fail: AtomicBool,
    hold: AtomicBool,
    /// Signalled when a held request has been received.
    pub received: Notify,
    /// Releases one held request.
    pub release: Notify,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    /// Hold each request until [`RecordingSink::release`] is notified.
    pub fn holding() -> Self {
        let sink = Self::default();
        sink.hold.store(true, Ordering::SeqCst);
        sink
    }

    pub fn set_hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(Destination, PingPayload)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.calls().into_iter().map(|(d, _)| d).collect()
    }
}

#[async_trait]
impl LocationSink for RecordingSink {
    async fn submit(&self, destination: Destination, payload: &PingPayload) -> Result<SinkAck> {
        self.calls
            .lock()
            .unwrap()
            .push((destination, payload.clone()));
        if self.hold.load(Ordering::SeqCst) {
            self.received.notify_one();
            self.release.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BeaconError::Reporting("502 bad gateway".to_owned()));
        }
        Ok(SinkAck {
            status: "success".to_owned(),
            stored_record: None,
        })
    }
}
