//! Tracker end to end: file mode store, HTTP sink, static location source.

use crate::helpers::{WAIT, fast_config, read_mode, wait_for, write_mode};
use beacon::mode::{FileModeStore, PingLedger};
use beacon::reporter::Destination;
use beacon::sampler::{StaticLocationSource, UnavailableLocationSource};
use beacon::{PingEvent, Tracker};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": []}))
}

fn source() -> Arc<StaticLocationSource> {
    Arc::new(StaticLocationSource::new(52.52, 13.40, 9.0))
}

#[tokio::test]
async fn voluntary_tracking_reports_and_records_last_ping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/locations"))
        .respond_with(ok_response())
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().expect("tempdir");
    write_mode(
        temp.path(),
        json!({"activeTrackingEnabled": true, "pingInterval": 100, "userId": "u-1"}),
    );
    let config = fast_config(&server.uri(), temp.path());

    let mut handle = Tracker::from_config(&config, source())
        .expect("tracker")
        .start();
    let mut events = handle.take_events().expect("events");

    let reported = wait_for(&mut events, |e| matches!(e, PingEvent::Reported { .. })).await;
    assert_eq!(
        reported,
        PingEvent::Reported {
            destination: Destination::Regular,
            status: "success".to_owned()
        }
    );

    let requests = server.received_requests().await.expect("recording enabled");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).expect("json body");
    assert_eq!(body["user_id"], "u-1");
    assert_eq!(body["latitude"], 52.52);
    assert_eq!(body["is_emergency"], false);

    let mode = read_mode(temp.path());
    assert!(mode.get("lastPingTime").is_none(), "settings document left untouched");
    let store = FileModeStore::new(temp.path().join("mode.json"));
    assert!(store.last_ping_ms().expect("ledger").is_some());
    assert!(temp.path().join("last_ping.json").exists());

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn emergency_switch_moves_pings_to_alerts_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/locations"))
        .respond_with(ok_response())
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/alerts"))
        .respond_with(ok_response())
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().expect("tempdir");
    write_mode(
        temp.path(),
        json!({"activeTrackingEnabled": true, "pingInterval": 80, "userId": "u-2"}),
    );
    let config = fast_config(&server.uri(), temp.path());
    let mut handle = Tracker::from_config(&config, source())
        .expect("tracker")
        .start();
    let mut events = handle.take_events().expect("events");

    wait_for(&mut events, |e| {
        matches!(
            e,
            PingEvent::Reported {
                destination: Destination::Regular,
                ..
            }
        )
    })
    .await;

    let mut mode = read_mode(temp.path());
    mode["emergencyMode"] = json!(true);
    write_mode(temp.path(), mode);

    wait_for(&mut events, |e| {
        matches!(
            e,
            PingEvent::Reported {
                destination: Destination::Emergency,
                ..
            }
        )
    })
    .await;

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn inactive_mode_never_reaches_the_sink() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_response())
        .expect(0)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().expect("tempdir");
    write_mode(temp.path(), json!({"pingInterval": 20, "userId": "u-3"}));
    let mut config = fast_config(&server.uri(), temp.path());
    config.scheduler.default_ping_interval_ms = 20;

    let mut handle = Tracker::from_config(&config, source())
        .expect("tracker")
        .start();
    let mut events = handle.take_events().expect("events");

    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown().await.expect("shutdown");

    wait_for(&mut events, |e| *e == PingEvent::Stopped).await;
    assert!(server.received_requests().await.expect("recording").is_empty());
}

#[tokio::test]
async fn failing_endpoint_keeps_normal_cadence() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().expect("tempdir");
    write_mode(
        temp.path(),
        json!({"activeTrackingEnabled": true, "pingInterval": 400, "userId": "u-4"}),
    );
    let config = fast_config(&server.uri(), temp.path());
    let mut handle = Tracker::from_config(&config, source())
        .expect("tracker")
        .start();
    let mut events = handle.take_events().expect("events");

    wait_for(&mut events, |e| matches!(e, PingEvent::ReportFailed { .. })).await;
    let rearmed = wait_for(&mut events, |e| matches!(e, PingEvent::Armed { .. })).await;
    match rearmed {
        PingEvent::Armed { delay, .. } => assert!(
            delay > Duration::from_millis(200),
            "failed report must not collapse the next delay: {delay:?}"
        ),
        other => panic!("unexpected event {other:?}"),
    }

    let store = FileModeStore::new(temp.path().join("mode.json"));
    assert!(store.last_ping_ms().expect("ledger").is_some());
    assert_eq!(server.received_requests().await.expect("recording").len(), 1);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn missing_location_device_still_reschedules() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok_response())
        .expect(0)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().expect("tempdir");
    write_mode(
        temp.path(),
        json!({"emergencyMode": true, "pingInterval": 50, "userId": "u-5"}),
    );
    let config = fast_config(&server.uri(), temp.path());
    let mut handle = Tracker::from_config(&config, Arc::new(UnavailableLocationSource))
        .expect("tracker")
        .start();
    let mut events = handle.take_events().expect("events");

    wait_for(&mut events, |e| matches!(e, PingEvent::SamplingFailed { .. })).await;
    wait_for(&mut events, |e| matches!(e, PingEvent::Armed { .. })).await;
    wait_for(&mut events, |e| matches!(e, PingEvent::SamplingFailed { .. })).await;

    tokio::time::timeout(WAIT, handle.shutdown())
        .await
        .expect("shutdown completes")
        .expect("clean shutdown");
}
