//! HTTP location sink against a mock server.

use beacon::BeaconError;
use beacon::config::SinkConfig;
use beacon::reporter::{Destination, HttpLocationSink, LocationSink, PingPayload};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payload(is_emergency: bool) -> PingPayload {
    PingPayload {
        latitude: 37.77,
        longitude: -122.41,
        accuracy: 15.0,
        user_id: "user-123".to_owned(),
        is_emergency,
    }
}

fn sink_for(server: &MockServer) -> HttpLocationSink {
    HttpLocationSink::new(&SinkConfig {
        base_url: server.uri(),
        ..SinkConfig::default()
    })
    .expect("build sink")
}

#[tokio::test]
async fn regular_ping_posts_json_to_locations_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/locations"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "latitude": 37.77,
            "longitude": -122.41,
            "accuracy": 15.0,
            "user_id": "user-123",
            "is_emergency": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": [{"id": 17}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ack = sink_for(&server)
        .submit(Destination::Regular, &payload(false))
        .await
        .expect("ack");
    assert_eq!(ack.status, "success");
    assert_eq!(ack.stored_record, Some(json!([{"id": 17}])));
}

#[tokio::test]
async fn emergency_ping_goes_to_alerts_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/alerts"))
        .and(body_partial_json(json!({"is_emergency": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let ack = sink_for(&server)
        .submit(Destination::Emergency, &payload(true))
        .await
        .expect("ack");
    assert_eq!(ack.status, "success");
    assert!(ack.stored_record.is_none());
}

#[tokio::test]
async fn express_style_acknowledgement_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "success": true,
            "location": {"id": 4, "latitude": 37.77}
        })))
        .mount(&server)
        .await;

    let ack = sink_for(&server)
        .submit(Destination::Regular, &payload(false))
        .await
        .expect("ack");
    assert_eq!(ack.status, "success");
    assert_eq!(ack.stored_record.expect("record")["id"], 4);
}

#[tokio::test]
async fn server_error_is_a_reporting_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/locations"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "status": "error",
            "error": {"message": "insert failed"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = sink_for(&server)
        .submit(Destination::Regular, &payload(false))
        .await
        .expect_err("500 should fail");
    assert!(matches!(err, BeaconError::Reporting(ref m) if m.contains("500")));
}

#[tokio::test]
async fn error_status_in_ok_body_is_a_reporting_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "error": "duplicate key"
        })))
        .mount(&server)
        .await;

    let result = sink_for(&server)
        .submit(Destination::Emergency, &payload(true))
        .await;
    assert!(matches!(result, Err(BeaconError::Reporting(_))));
}

#[tokio::test]
async fn slow_endpoint_hits_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/locations"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "success"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let sink = HttpLocationSink::new(&SinkConfig {
        base_url: server.uri(),
        request_timeout_ms: Some(100),
        ..SinkConfig::default()
    })
    .expect("build sink");

    let result = sink.submit(Destination::Regular, &payload(false)).await;
    assert!(matches!(result, Err(BeaconError::Reporting(_))));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_reporting_failure() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let sink = HttpLocationSink::new(&SinkConfig {
        base_url: uri,
        request_timeout_ms: Some(1_000),
        ..SinkConfig::default()
    })
    .expect("build sink");
    let result = sink.submit(Destination::Regular, &payload(false)).await;
    assert!(matches!(result, Err(BeaconError::Reporting(_))));
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/backend/api/alerts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;

    let sink = HttpLocationSink::new(&SinkConfig {
        base_url: format!("{}/backend", server.uri()),
        ..SinkConfig::default()
    })
    .expect("build sink");
    let ack = sink
        .submit(Destination::Emergency, &payload(true))
        .await
        .expect("ack");
    assert_eq!(ack.status, "success");
}
