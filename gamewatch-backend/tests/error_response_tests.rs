use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use gamewatch_backend::{AppState, config::Config, create_app};
use gamewatch_core::ProtocolRegistry;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

/// Helper to create the app with the built-in protocols only
fn setup_test_app() -> axum::Router {
    let config = Config {
        max_addresses_per_request: 2,
        ..Config::default()
    };
    let state = AppState::new(&config, Arc::new(ProtocolRegistry::with_builtin()));
    create_app(state, config.request_timeout, None)
}

/// Helper to send a request and get response
async fn send_request(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let request = Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes();

    let json = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };

    (status, content_type, json)
}

#[tokio::test]
async fn test_error_response_format_for_invalid_addresses() {
    // GIVEN: A running application
    let app = setup_test_app();

    // WHEN: Requesting with an unparseable address list
    let (status, content_type, body) = send_request(app, "/?addresses=not-an-address").await;

    // THEN: Should return 400 with JSON error
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(content_type.as_deref(), Some("application/json"));

    // AND: Error response should have proper structure
    assert!(body.get("error").is_some(), "Response should have 'error' field");
    assert!(body.get("details").is_none(), "No details for a format error");
    let error_msg = body["error"].as_str().unwrap();
    assert!(
        error_msg.contains("type:ip:port"),
        "Error message should show the expected format: {}",
        error_msg
    );
}

#[tokio::test]
async fn test_error_response_for_too_many_addresses() {
    // GIVEN: A limit of two addresses per request
    let app = setup_test_app();

    // WHEN: Asking for three
    let (status, _content_type, body) = send_request(
        app,
        "/?addresses=tcp:10.0.0.1:1,tcp:10.0.0.2:2,tcp:10.0.0.3:3",
    )
    .await;

    // THEN: Should return 400 with the limit explained
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error_msg = body["error"].as_str().unwrap();
    assert!(
        error_msg.contains("max 2") && error_msg.contains("got 3"),
        "Error should mention the limit: {}",
        error_msg
    );

    // AND: Details suggest how to proceed
    let details = body["details"].as_str().unwrap();
    assert!(details.contains("batches"), "Details: {}", details);
}

#[tokio::test]
async fn test_unreachable_server_is_not_an_error_response() {
    // GIVEN: A running application
    let app = setup_test_app();

    // WHEN: Asking for a protocol that is not registered
    let (status, _content_type, body) =
        send_request(app, "/?addresses=counterstrike2:10.0.0.1:27015").await;

    // THEN: The request itself succeeds
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("error").is_none());

    // AND: The failure is reported on the record
    let record = &body["servers"][0];
    assert_eq!(record["online"], false);
    let error_msg = record["error"].as_str().unwrap();
    assert!(
        !error_msg.contains("panic"),
        "Should not expose panic details"
    );
    assert!(error_msg.contains("unsupported"), "Error: {}", error_msg);
}
