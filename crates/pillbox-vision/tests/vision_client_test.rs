//! Integration tests for the vision client against a mock upstream.
//!
//! Covers both reply transports (single JSON object and SSE stream) and
//! the status-code-to-error mapping.

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use pillbox_core::Error;
use pillbox_vision::{extract, VisionClient, VisionConfig};

fn client_for(server: &MockServer) -> VisionClient {
    let config = VisionConfig {
        base_url: format!("{}/v1/chat/completions", server.uri()),
        api_key: Some("test-key".to_string()),
        model: "test-vision-model".to_string(),
        timeout_seconds: 5,
        ..VisionConfig::default()
    };
    VisionClient::new(config).unwrap()
}

fn jpeg_bytes() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]
}

#[tokio::test]
async fn analyze_parses_json_reply() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"name\":\"Aspirin\",\"expiry_date\":\"2025-06-01\"}"
                },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client.analyze(&[jpeg_bytes()]).await.unwrap();

    let analysis = extract(&reply);
    assert_eq!(analysis.name.as_deref(), Some("Aspirin"));
    assert_eq!(analysis.expiry_date.as_deref(), Some("2025-06-01"));
}

#[tokio::test]
async fn analyze_reassembles_sse_reply() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"name\\\":\\\"Ibu\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"profen\\\"}\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client.analyze(&[jpeg_bytes()]).await.unwrap();
    assert_eq!(reply, "{\"name\":\"Ibuprofen\"}");

    let analysis = extract(&reply);
    assert_eq!(analysis.name.as_deref(), Some("Ibuprofen"));
}

#[tokio::test]
async fn analyze_sends_all_images() {
    let server = MockServer::start().await;

    // The responder answers 200 only when the payload carries one text part
    // plus one inline image part per uploaded image.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(move |req: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap_or_default();
            let parts = body["messages"][0]["content"].as_array().cloned().unwrap_or_default();
            let well_formed = parts.len() == 3
                && parts[0]["type"] == "text"
                && parts[1]["type"] == "image_url"
                && parts[2]["image_url"]["url"]
                    .as_str()
                    .map(|u| u.starts_with("data:image/jpeg;base64,"))
                    .unwrap_or(false);
            if well_formed {
                ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{
                        "message": {"role": "assistant", "content": "{}"},
                        "finish_reason": "stop"
                    }]
                }))
            } else {
                ResponseTemplate::new(500).set_body_string("unexpected payload shape")
            }
        })
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client
        .analyze(&[jpeg_bytes(), jpeg_bytes()])
        .await
        .unwrap();
    assert_eq!(reply, "{}");
}

#[tokio::test]
async fn analyze_maps_401_to_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.analyze(&[jpeg_bytes()]).await.unwrap_err();
    match err {
        Error::Auth(msg) => assert!(msg.contains("invalid api key")),
        other => panic!("expected Auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn analyze_maps_404_to_endpoint_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.analyze(&[jpeg_bytes()]).await.unwrap_err();
    match err {
        Error::Endpoint(msg) => assert!(msg.contains("no such model")),
        other => panic!("expected Endpoint error, got {:?}", other),
    }
}

#[tokio::test]
async fn analyze_maps_other_status_to_upstream_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.analyze(&[jpeg_bytes()]).await.unwrap_err();
    match err {
        Error::Upstream { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected Upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn analyze_rejects_empty_image_list() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    let err = client.analyze(&[]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn analyze_falls_back_to_delta_content() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "delta": {"content": "{\"name\":\"Aspirin\"}"},
                "finish_reason": null
            }]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client.analyze(&[jpeg_bytes()]).await.unwrap();
    assert_eq!(reply, "{\"name\":\"Aspirin\"}");
}

#[tokio::test]
async fn health_check_probes_models_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.health_check().await);
}

#[tokio::test]
async fn health_check_fails_on_unreachable_upstream() {
    let server = MockServer::start().await;
    let client = client_for(&server);
    // No mock mounted: the server answers 404 for every request.
    assert!(!client.health_check().await);
}
