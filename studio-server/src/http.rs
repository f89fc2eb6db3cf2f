//! Studio HTTP REST API
//!
//! Axum-based HTTP boundary that keeps the Gemini API key on the server.
//! The server is stateless: it forwards style extraction and image generation
//! to a `StyleGateway` and wraps every outcome in the `{success, ...}` envelope.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, body)`. The inner functions are
//! directly testable without axum dispatch.
//!
//! Endpoints:
//! - POST /train    : extract a style descriptor from example images
//! - POST /generate : render an image from a descriptor
//! - GET  /models   : list Gemini models visible to the key
//! - GET  /health   : health check with gateway status
//! - GET  /version  : server version info

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use studio_core::envelope::{Envelope, GenerateRequest, TrainRequest};
use studio_core::gateway::{GatewayError, StyleGateway};
use studio_core::{GeminiClient, StudioConfig};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

const MISSING_KEY: &str = "GEMINI_API_KEY is missing in environment variables";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    /// `None` when no API key is configured; every gateway route then fails.
    pub gateway: Option<Arc<dyn StyleGateway>>,
    /// Model listing is Gemini-specific, so it is kept apart from the gateway.
    pub gemini: Option<GeminiClient>,
    pub config: StudioConfig,
}

impl HttpState {
    /// Wire a Gemini client into both roles, or neither when it is absent.
    pub fn from_gemini(gemini: Option<GeminiClient>, config: StudioConfig) -> Self {
        let gateway = gemini
            .clone()
            .map(|client| Arc::new(client) as Arc<dyn StyleGateway>);
        Self {
            gateway,
            gemini,
            config,
        }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let body_limit = state.config.http.max_body_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/models", get(models_handler))
        .route("/train", post(train_handler))
        .route("/generate", post(generate_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(state: HttpState, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Studio HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

fn gateway_failure(route: &str, err: GatewayError) -> (StatusCode, Envelope) {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    tracing::error!(route, status = status.as_u16(), error = %err, "Gateway call failed");
    (status, Envelope::err(err.to_string()))
}

/// Inner train: validates the upload and extracts a descriptor.
pub async fn train_inner(gateway: Option<&dyn StyleGateway>, req: TrainRequest) -> (StatusCode, Envelope) {
    let images = match req.style_images {
        Some(images) if !images.is_empty() => images,
        _ => return (StatusCode::BAD_REQUEST, Envelope::err("Missing style images")),
    };

    let Some(gateway) = gateway else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Envelope::err(MISSING_KEY));
    };

    let start = Instant::now();
    let instruction = req.training_instruction.filter(|i| !i.trim().is_empty());

    match gateway.extract_style(&images, instruction.as_deref()).await {
        Ok(descriptor) => {
            tracing::info!(
                images = images.len(),
                took_ms = start.elapsed().as_millis() as u64,
                "Style extracted"
            );
            (StatusCode::OK, Envelope::descriptor(descriptor))
        }
        Err(e) => gateway_failure("/train", e),
    }
}

/// Inner generate: requires a descriptor and a model, then renders.
pub async fn generate_inner(
    gateway: Option<&dyn StyleGateway>,
    req: GenerateRequest,
) -> (StatusCode, Envelope) {
    let Some(request) = req.into_generation_request() else {
        return (
            StatusCode::BAD_REQUEST,
            Envelope::err("Missing styleDescriptor or modelName"),
        );
    };

    let Some(gateway) = gateway else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Envelope::err(MISSING_KEY));
    };

    let start = Instant::now();
    match gateway.generate(&request).await {
        Ok(result) => {
            tracing::info!(
                model = %request.model_id,
                took_ms = start.elapsed().as_millis() as u64,
                "Generation finished"
            );
            (StatusCode::OK, Envelope::generated(result))
        }
        Err(e) => gateway_failure("/generate", e),
    }
}

/// Inner models: lists model names through the Gemini client.
pub async fn models_inner(gemini: Option<&GeminiClient>) -> (StatusCode, Envelope) {
    let Some(gemini) = gemini else {
        return (StatusCode::INTERNAL_SERVER_ERROR, Envelope::err(MISSING_KEY));
    };

    match gemini.list_models().await {
        Ok(models) => (StatusCode::OK, Envelope::models(models)),
        Err(e) => {
            tracing::error!(error = %e, "Model listing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Envelope::err(e.to_string()))
        }
    }
}

/// Inner health check (no IO; the upstream is not probed).
pub fn health_inner(gateway: Option<&dyn StyleGateway>) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({
            "status": if gateway.is_some() { "healthy" } else { "degraded" },
            "version": env!("CARGO_PKG_VERSION"),
            "gateway": gateway.map(|g| g.name()).unwrap_or("none"),
            "apiKeyConfigured": gateway.is_some(),
        }),
    )
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "studio/1",
    })
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.gateway.as_deref());
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn models_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = models_inner(state.gemini.as_ref()).await;
    (status, Json(body))
}

pub async fn train_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<TrainRequest>,
) -> impl IntoResponse {
    let (status, body) = train_inner(state.gateway.as_deref(), req).await;
    (status, Json(body))
}

pub async fn generate_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<GenerateRequest>,
) -> impl IntoResponse {
    let (status, body) = generate_inner(state.gateway.as_deref(), req).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
