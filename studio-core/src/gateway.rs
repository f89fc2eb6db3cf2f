//! Style gateways: the two calls made to the external generative model.
//!
//! `StyleGateway` is implemented by:
//! - `GeminiClient`: talks to the Gemini API directly (server side)
//! - `RemoteGateway`: proxies through the studio server's `/train` and `/generate`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data_uri::DataUri;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing or malformed input. Raised before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("Style extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Image generation failed: {0}")]
    GenerationFailed(String),
}

impl GatewayError {
    pub fn is_validation(&self) -> bool {
        matches!(self, GatewayError::Validation(_))
    }
}

/// Inputs for one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub descriptor: String,
    pub model_id: String,
    pub aspect_ratio: Option<String>,
    pub instruction: Option<String>,
    /// Selects image-conditioned mode when present.
    pub reference_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GenerationResult {
    /// Data URI of the generated image.
    Image(String),
    /// The model answered with text only.
    TextFallback(String),
}

/// One part of a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    Text(String),
    Image(DataUri),
}

/// First image part wins; with no image, all text parts are concatenated.
pub fn select_output(parts: &[ResponsePart]) -> GenerationResult {
    parts
        .iter()
        .find_map(|part| match part {
            ResponsePart::Image(uri) => Some(GenerationResult::Image(uri.to_string())),
            ResponsePart::Text(_) => None,
        })
        .unwrap_or_else(|| GenerationResult::TextFallback(response_text(parts).unwrap_or_default()))
}

/// Concatenated text parts, or `None` if there is no non-empty text.
pub fn response_text(parts: &[ResponsePart]) -> Option<String> {
    let text: String = parts
        .iter()
        .filter_map(|part| match part {
            ResponsePart::Text(t) => Some(t.as_str()),
            ResponsePart::Image(_) => None,
        })
        .collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parse every image, failing with a `Validation` error that names the bad index.
pub fn parse_images(images: &[String]) -> Result<Vec<DataUri>, GatewayError> {
    images
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            DataUri::parse(raw)
                .map_err(|e| GatewayError::Validation(format!("Image {} is not a valid data URI: {}", i, e)))
        })
        .collect()
}

impl GenerationRequest {
    /// Required-field checks shared by every gateway implementation.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.descriptor.trim().is_empty() {
            return Err(GatewayError::Validation("Missing style descriptor".to_string()));
        }
        if self.model_id.trim().is_empty() {
            return Err(GatewayError::Validation("Missing model name".to_string()));
        }
        if let Some(reference) = &self.reference_image {
            DataUri::parse(reference).map_err(|e| {
                GatewayError::Validation(format!("Reference image is not a valid data URI: {}", e))
            })?;
        }
        Ok(())
    }
}

/// The external generative model, as seen by the studio.
#[async_trait]
pub trait StyleGateway: Send + Sync {
    /// Extract a textual style descriptor from example images.
    async fn extract_style(
        &self,
        images: &[String],
        instruction: Option<&str>,
    ) -> Result<String, GatewayError>;

    /// Produce an image (or a text fallback) in the given style.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError>;

    /// Gateway name for logging.
    fn name(&self) -> &str;
}
