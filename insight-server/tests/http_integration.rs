//! HTTP integration tests for the WorkLink Insight API
//!
//! The real CMS and OpenAI clients are pointed at wiremock servers and the
//! router is driven end to end with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use insight_core::{GraphQlCmsClient, InsightConfig, OpenAiClient};
use insight_server::http::{build_router, HttpState};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FAKE_MP3: &[u8] = &[0x49, 0x44, 0x33, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x21];

struct Harness {
    cms: MockServer,
    openai: MockServer,
    app: Router,
}

async fn harness() -> Harness {
    let cms = MockServer::start().await;
    let openai = MockServer::start().await;
    let config = InsightConfig::default();

    let events = GraphQlCmsClient::with_endpoint(
        config.cms.clone(),
        "cms-token".to_string(),
        format!("{}/api/v3/graphql", cms.uri()),
    )
    .expect("cms client");
    let ai = Arc::new(
        OpenAiClient::with_base_url(
            config.openai.clone(),
            "sk-test".to_string(),
            format!("{}/v1", openai.uri()),
        )
        .expect("openai client"),
    );

    let state = HttpState {
        config,
        events: Arc::new(events),
        vision: ai.clone(),
        speech: ai,
    };

    Harness {
        cms,
        openai,
        app: build_router(Arc::new(state)),
    }
}

fn scenario_nodes() -> Value {
    json!({
        "data": {
            "scenarioSessionEvents": {
                "nodes": [
                    { "id": "1", "type": "PHOTO", "eventData": { "user_name": "A" }, "photo": { "fileUrl": "u1" } },
                    { "id": "2", "type": "PHOTO", "eventData": "{\"user_name\":\"B\"}", "photo": null }
                ]
            }
        }
    })
}

async fn mount_cms(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/api/v3/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, body.to_vec())
}

fn as_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("body should be JSON")
}

// ===========================================================================
// Listings
// ===========================================================================

#[tokio::test]
async fn test_get_users_scenario() {
    let h = harness().await;
    mount_cms(&h.cms, scenario_nodes()).await;

    let (status, _, body) = get(&h.app, "/get-users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "userNames": ["A", "B"] }));
}

#[tokio::test]
async fn test_get_photo_scenario_unfiltered_and_filtered() {
    let h = harness().await;
    mount_cms(&h.cms, scenario_nodes()).await;

    let (status, _, body) = get(&h.app, "/get-photo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "photoUrls": ["u1"] }));

    let (status, _, body) = get(&h.app, "/get-photo?user=B").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "photoUrls": [] }));

    let (_, _, body) = get(&h.app, "/get-photo?user=A").await;
    assert_eq!(as_json(&body), json!({ "photoUrls": ["u1"] }));
}

#[tokio::test]
async fn test_get_photo_user_filter_is_url_decoded() {
    let h = harness().await;
    mount_cms(
        &h.cms,
        json!({
            "data": { "scenarioSessionEvents": { "nodes": [
                { "eventData": { "user_name": "Ana María" }, "photo": { "fileUrl": "p1" } },
                { "eventData": { "user_name": "Ana" }, "photo": { "fileUrl": "p2" } }
            ] } }
        }),
    )
    .await;

    let (_, _, body) = get(&h.app, "/get-photo?user=Ana%20Mar%C3%ADa").await;
    assert_eq!(as_json(&body), json!({ "photoUrls": ["p1"] }));
}

#[tokio::test]
async fn test_unparseable_record_is_excluded_not_fatal() {
    let h = harness().await;
    mount_cms(
        &h.cms,
        json!({
            "data": { "scenarioSessionEvents": { "nodes": [
                { "eventData": "{\"user_name\": oops", "photo": { "fileUrl": "bad" } },
                { "eventData": { "user_name": "C" }, "photo": { "fileUrl": "good" } }
            ] } }
        }),
    )
    .await;

    let (status, _, body) = get(&h.app, "/get-users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "userNames": ["C"] }));

    let (status, _, body) = get(&h.app, "/get-photo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body), json!({ "photoUrls": ["good"] }));
}

#[tokio::test]
async fn test_cms_missing_nodes_is_500_plain_text() {
    let h = harness().await;
    mount_cms(&h.cms, json!({ "data": {} })).await;

    let (status, content_type, body) = get(&h.app, "/get-photo").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(content_type.unwrap_or_default().starts_with("text/plain"));
    assert_eq!(String::from_utf8(body).unwrap(), "Unexpected response structure from CMS");

    let (status, _, body) = get(&h.app, "/get-users").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(String::from_utf8(body).unwrap(), "Error fetching user names");
}

#[tokio::test]
async fn test_cms_transport_failure_is_500() {
    let h = harness().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&h.cms)
        .await;

    let (status, _, body) = get(&h.app, "/get-photo?user=A").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(String::from_utf8(body).unwrap(), "Error fetching photos");
}

// ===========================================================================
// Presence checks never reach the provider
// ===========================================================================

#[tokio::test]
async fn test_analyze_without_photo_url_is_400_and_skips_provider() {
    let h = harness().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.openai)
        .await;

    let (status, _, body) = get(&h.app, "/analyze-image").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8(body).unwrap(), "Missing photoUrl query parameter");
}

#[tokio::test]
async fn test_speech_without_text_is_400_and_skips_provider() {
    let h = harness().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.openai)
        .await;

    let (status, _, body) = get(&h.app, "/generate-speech").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8(body).unwrap(), "Missing text query parameter");
}

// ===========================================================================
// Analyze → speak
// ===========================================================================

#[tokio::test]
async fn test_analysis_text_feeds_speech_verbatim() {
    let h = harness().await;
    let description = "A technician tightening a red valve & gauge.";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "model": "gpt-4-vision-preview", "max_tokens": 300 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": description },
                "logprobs": null,
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&h.openai)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/audio/speech"))
        .and(body_partial_json(json!({ "input": description, "voice": "alloy", "model": "tts-1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "audio/mpeg")
                .set_body_bytes(FAKE_MP3),
        )
        .expect(1)
        .mount(&h.openai)
        .await;

    let (status, _, body) =
        get(&h.app, "/analyze-image?photoUrl=https%3A%2F%2Fcdn.example%2Fu1.jpg").await;
    assert_eq!(status, StatusCode::OK);
    let choice = as_json(&body);
    assert_eq!(choice["finish_reason"], "stop");
    assert!(choice.get("logprobs").is_some(), "metadata passes through");
    let text = choice["message"]["content"].as_str().unwrap().to_string();
    assert_eq!(text, description);

    let encoded: String = text
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect();
    let (status, content_type, audio) =
        get(&h.app, &format!("/generate-speech?text={}", encoded)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("audio/mpeg"));
    assert!(!audio.is_empty());
    assert_eq!(audio, FAKE_MP3);
}

#[tokio::test]
async fn test_analyze_provider_error_is_500() {
    let h = harness().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Invalid image URL" }
        })))
        .expect(1)
        .mount(&h.openai)
        .await;

    let (status, _, body) = get(&h.app, "/analyze-image?photoUrl=not-a-url").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(String::from_utf8(body).unwrap(), "Error processing your OpenAI request");
}

// ===========================================================================
// Ambient endpoints
// ===========================================================================

#[tokio::test]
async fn test_health_and_cors() {
    let h = harness().await;

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );

    let (status, _, body) = get(&h.app, "/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["service"], "worklink-insight");
}
