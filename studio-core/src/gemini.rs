//! Gemini `generateContent` client.
//!
//! Implements `StyleGateway` against the Gemini REST API:
//! - style extraction sends N inline images + the extraction prompt to the
//!   analysis model
//! - generation sends an optional reference image + a style prompt to the
//!   caller-chosen image model
//!
//! Single attempt per call. Errors are logged here and mapped to
//! `GatewayError` at the trait boundary.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::GeminiSettings;
use crate::data_uri::DataUri;
use crate::gateway::{
    parse_images, response_text, select_output, GatewayError, GenerationRequest, GenerationResult,
    ResponsePart, StyleGateway,
};
use crate::prompts;

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum GeminiError {
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("GEMINI_API_KEY is missing in environment variables")]
    MissingApiKey,

    #[error("Response contained no candidates")]
    EmptyResponse,
}

impl From<reqwest::Error> for GeminiError {
    /// Request URLs are dropped so they never reach logs or error envelopes.
    fn from(e: reqwest::Error) -> Self {
        GeminiError::Http(e.without_url())
    }
}

/// The key travels in this header, never in the URL.
const API_KEY_HEADER: &str = "x-goog-api-key";

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub extraction_model: String,
    pub timeout_seconds: u64,
}

impl GeminiConfig {
    /// Build from settings, taking the key from `GEMINI_API_KEY` (or
    /// `GOOGLE_API_KEY`) when not given explicitly.
    pub fn from_settings(api_key: Option<String>, settings: &GeminiSettings) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            extraction_model: settings.extraction_model.clone(),
            timeout_seconds: settings.timeout_seconds,
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing)]
    thought: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl WirePart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }

    fn image(uri: DataUri) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: uri.mime_type,
                data: uri.data,
            }),
            ..Self::default()
        }
    }

    fn into_response_part(self) -> Option<ResponsePart> {
        if self.thought == Some(true) {
            return None;
        }
        if let Some(inline) = self.inline_data {
            return Some(ResponsePart::Image(DataUri::new(inline.mime_type, inline.data)));
        }
        self.text.map(ResponsePart::Text)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GeminiError> {
        if config.api_key.is_empty() {
            return Err(GeminiError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a client with a custom base URL (for testing / proxies)
    pub fn with_base_url(mut config: GeminiConfig, base_url: String) -> Result<Self, GeminiError> {
        config.base_url = base_url.trim_end_matches('/').to_string();
        Self::new(config)
    }

    /// One `generateContent` call; returns the first candidate's parts.
    async fn generate_content(
        &self,
        model: &str,
        parts: Vec<WirePart>,
    ) -> Result<Vec<ResponsePart>, GeminiError> {
        let url = format!("{}/models/{}:generateContent", self.config.base_url, model);

        let request = GenerateContentRequest {
            contents: vec![Content { role: "user", parts }],
        };

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: GenerateContentResponse = response.json().await?;
        let candidate = body
            .candidates
            .into_iter()
            .next()
            .ok_or(GeminiError::EmptyResponse)?;

        Ok(candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(WirePart::into_response_part)
            .collect())
    }

    /// Names of all models visible to this API key, following pagination.
    pub async fn list_models(&self) -> Result<Vec<String>, GeminiError> {
        let url = format!("{}/models", self.config.base_url);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url).header(API_KEY_HEADER, &self.config.api_key);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await?;
            let response = check_status(response).await?;
            let page: ListModelsResponse = response.json().await?;

            names.extend(page.models.into_iter().map(|m| m.name));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(names)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GeminiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();
    let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
        .ok()
        .and_then(|e| e.error);

    let (code, message) = error_detail
        .map(|e| (e.code, e.message))
        .unwrap_or((status.as_u16(), error_body));

    tracing::error!(code = code, message = %message, "Gemini API error");

    Err(GeminiError::Api { code, message })
}

#[async_trait]
impl StyleGateway for GeminiClient {
    async fn extract_style(
        &self,
        images: &[String],
        instruction: Option<&str>,
    ) -> Result<String, GatewayError> {
        if images.is_empty() {
            return Err(GatewayError::Validation("Missing style images".to_string()));
        }

        let mut parts: Vec<WirePart> = parse_images(images)?.into_iter().map(WirePart::image).collect();
        parts.push(WirePart::text(prompts::extraction_prompt(instruction)));

        tracing::info!(
            model = %self.config.extraction_model,
            images = images.len(),
            "Requesting style extraction"
        );

        let response = self
            .generate_content(&self.config.extraction_model, parts)
            .await
            .map_err(|e| GatewayError::ExtractionFailed(e.to_string()))?;

        response_text(&response)
            .ok_or_else(|| GatewayError::ExtractionFailed("AI failed to generate a descriptor.".to_string()))
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError> {
        request.validate()?;

        let mut parts = Vec::with_capacity(2);
        let prompt = match &request.reference_image {
            Some(reference) => {
                let uri = DataUri::parse(reference).map_err(|e| {
                    GatewayError::Validation(format!("Reference image is not a valid data URI: {}", e))
                })?;
                parts.push(WirePart::image(uri));
                prompts::image_conditioned_prompt(
                    &request.descriptor,
                    request.aspect_ratio.as_deref(),
                    request.instruction.as_deref(),
                )
            }
            None => prompts::text_only_prompt(
                &request.descriptor,
                request.aspect_ratio.as_deref(),
                request.instruction.as_deref(),
            ),
        };
        parts.push(WirePart::text(prompt));

        tracing::info!(
            model = %request.model_id,
            conditioned = request.reference_image.is_some(),
            "Requesting image generation"
        );
        tracing::debug!(descriptor = %request.descriptor, "Generation style descriptor");

        let response = self
            .generate_content(&request.model_id, parts)
            .await
            .map_err(|e| GatewayError::GenerationFailed(e.to_string()))?;

        let result = select_output(&response);
        if let GenerationResult::TextFallback(text) = &result {
            tracing::warn!(
                model = %request.model_id,
                text_len = text.len(),
                "Model returned no image; falling back to text"
            );
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================
