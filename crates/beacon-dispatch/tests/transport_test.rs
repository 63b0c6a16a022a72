//! HTTP transport tests against a local mock server.

use beacon_core::Event;
use beacon_dispatch::{DispatchConfig, HttpTransport, Transport, TransportError};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn transport() -> HttpTransport {
    HttpTransport::new(&DispatchConfig::default()).expect("client should build")
}

fn sample_payload() -> bytes::Bytes {
    Event::new().with("visitor_id", "v-1").with("revenue", 12).to_bytes()
}

#[tokio::test]
async fn successful_delivery_returns_receipt() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/v1/impression"))
        .respond_with(ResponseTemplate::new(200).set_body_string("accepted"))
        .mount(&server)
        .await;

    let receipt = transport()
        .send(format!("{}/v1/impression", server.uri()), sample_payload())
        .await
        .expect("delivery should succeed");

    assert_eq!(receipt.status, 200);
    assert_eq!(receipt.body, "accepted");
}

#[tokio::test]
async fn server_error_maps_to_http_status() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .mount(&server)
        .await;

    let error = transport()
        .send(server.uri(), sample_payload())
        .await
        .expect_err("5xx should be a failure");

    match error {
        TransportError::HttpStatus { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "try later");
        },
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn client_error_maps_to_http_status() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let error = transport()
        .send(server.uri(), sample_payload())
        .await
        .expect_err("4xx should be a failure");

    assert_eq!(error.status(), Some(400));
}

#[tokio::test]
async fn connection_failure_maps_to_network_error() {
    // Nothing listens on port 1.
    let error = transport()
        .send("http://127.0.0.1:1/v1/impression".to_string(), sample_payload())
        .await
        .expect_err("connect should fail");

    assert!(matches!(error, TransportError::Network { .. }));
}

#[tokio::test]
async fn payload_and_metadata_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::header("content-type", "application/json"))
        .and(matchers::header_exists("x-beacon-dispatch-id"))
        .and(matchers::header_exists("x-beacon-sent-at"))
        .and(matchers::body_bytes(sample_payload().to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = transport().send(server.uri(), sample_payload()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn configured_user_agent_is_applied() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::header("user-agent", "Beacon-Dispatch/0.1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = transport().send(server.uri(), sample_payload()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn oversized_response_body_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(8 * 1024)))
        .mount(&server)
        .await;

    let receipt = transport()
        .send(server.uri(), sample_payload())
        .await
        .expect("delivery should succeed");

    assert!(receipt.body.len() <= 1024);
    assert!(receipt.body.ends_with("... (truncated)"));
}
