//! HTTP integration tests for the studio REST API
//!
//! Routes are dispatched through the full Axum router with `oneshot`. The
//! gateway is either a scripted in-process mock or a real `GeminiClient`
//! pointed at a wiremock server.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use studio_core::gateway::{GatewayError, GenerationRequest, GenerationResult, StyleGateway};
use studio_core::{GeminiClient, GeminiConfig, StudioConfig};
use studio_server::http::{build_router, HttpState};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

/// Returns a descriptor naming the image count; renders text when asked for "words".
struct ScriptedGateway;

#[async_trait]
impl StyleGateway for ScriptedGateway {
    async fn extract_style(
        &self,
        images: &[String],
        _instruction: Option<&str>,
    ) -> Result<String, GatewayError> {
        Ok(format!("Descriptor from {} images", images.len()))
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError> {
        request.validate()?;
        if request.instruction.as_deref() == Some("words") {
            return Ok(GenerationResult::TextFallback("just text".to_string()));
        }
        Ok(GenerationResult::Image(PNG.to_string()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn scripted_state() -> Arc<HttpState> {
    Arc::new(HttpState {
        gateway: Some(Arc::new(ScriptedGateway)),
        gemini: None,
        config: StudioConfig::default(),
    })
}

async fn call(state: Arc<HttpState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let app = build_router(state);
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let req = match body {
        Some(b) => req.body(Body::from(b.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// ===========================================================================
// TEST 1: GET /version via oneshot: returns version and protocol
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let (status, json) = call(scripted_state(), "GET", "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["version"].is_string());
    assert_eq!(json["protocol"], "studio/1");
}

// ===========================================================================
// TEST 2: GET /health: reports the gateway
// ===========================================================================
#[tokio::test]
async fn test_health_endpoint() {
    let (status, json) = call(scripted_state(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["gateway"], "scripted");
    assert_eq!(json["apiKeyConfigured"], true);
}

// ===========================================================================
// TEST 3: POST /train: success envelope carries the descriptor
// ===========================================================================
#[tokio::test]
async fn test_train_endpoint_success() {
    let body = json!({
        "styleImages": [PNG, PNG, PNG],
        "trainingInstruction": "high contrast"
    });
    let (status, json) = call(scripted_state(), "POST", "/train", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true, "descriptor": "Descriptor from 3 images"}));
}

// ===========================================================================
// TEST 4: POST /train: missing images is a 400 failure envelope
// ===========================================================================
#[tokio::test]
async fn test_train_endpoint_missing_images() {
    let (status, json) = call(scripted_state(), "POST", "/train", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Missing style images");
}

// ===========================================================================
// TEST 5: POST /generate: image and text fallback envelopes
// ===========================================================================
#[tokio::test]
async fn test_generate_endpoint_outcomes() {
    let body = json!({
        "styleDescriptor": "Vibrant neon palette",
        "referenceImage": PNG,
        "modelName": "model-a",
        "aspectRatio": "16:9"
    });
    let (status, json) = call(scripted_state(), "POST", "/generate", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true, "image": PNG}));

    let body = json!({
        "styleDescriptor": "Vibrant neon palette",
        "instruction": "words",
        "modelName": "model-a"
    });
    let (status, json) = call(scripted_state(), "POST", "/generate", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"success": true, "text": "just text", "fallbackImage": true}));
}

// ===========================================================================
// TEST 6: POST /generate: missing descriptor and malformed JSON are rejected
// ===========================================================================
#[tokio::test]
async fn test_generate_endpoint_rejects_bad_input() {
    let body = json!({"modelName": "model-a", "instruction": "a cat"});
    let (status, json) = call(scripted_state(), "POST", "/generate", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let app = build_router(scripted_state());
    let req = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert!(resp.status().is_client_error());
}

// ===========================================================================
// TEST 7: no API key: gateway routes fail with 500, health is degraded
// ===========================================================================
#[tokio::test]
async fn test_routes_without_api_key() {
    let state = Arc::new(HttpState::from_gemini(None, StudioConfig::default()));

    let (status, json) = call(state.clone(), "POST", "/train", Some(json!({"styleImages": [PNG]}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("GEMINI_API_KEY"));

    let (_, json) = call(state, "GET", "/health", None).await;
    assert_eq!(json["status"], "degraded");
}

// ===========================================================================
// TEST 8: full path through GeminiClient against a mocked Gemini API
// ===========================================================================
#[tokio::test]
async fn test_gemini_backed_train_and_models() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/extract-model:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Vibrant neon palette..."}]}}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "models/gemini-a"}, {"name": "models/gemini-b"}]
        })))
        .mount(&server)
        .await;

    let config = GeminiConfig {
        api_key: "test-key".to_string(),
        base_url: server.uri(),
        extraction_model: "extract-model".to_string(),
        timeout_seconds: 5,
    };
    let client = GeminiClient::new(config).unwrap();
    let state = Arc::new(HttpState::from_gemini(Some(client), StudioConfig::default()));

    let (status, json) = call(
        state.clone(),
        "POST",
        "/train",
        Some(json!({"styleImages": [PNG, PNG, PNG]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["descriptor"], "Vibrant neon palette...");

    let (status, json) = call(state, "GET", "/models", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["models"], json!(["models/gemini-a", "models/gemini-b"]));
}

// ===========================================================================
// TEST 9: upstream transport failure: 500 envelope without the API key
// ===========================================================================
#[tokio::test]
async fn test_upstream_timeout_keeps_key_private() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"candidates": []}))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = GeminiConfig {
        api_key: "SECRET-KEY-123".to_string(),
        base_url: server.uri(),
        extraction_model: "extract-model".to_string(),
        timeout_seconds: 1,
    };
    let client = GeminiClient::new(config).unwrap();
    let state = Arc::new(HttpState::from_gemini(Some(client), StudioConfig::default()));

    let body = json!({
        "styleDescriptor": "Vibrant neon palette",
        "instruction": "a lighthouse",
        "modelName": "model-a"
    });
    let (status, json) = call(state, "POST", "/generate", Some(body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    let error = json["error"].as_str().unwrap();
    assert!(!error.contains("SECRET-KEY-123"), "key leaked: {error}");
}
