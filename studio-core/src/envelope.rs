//! JSON wire types for the studio HTTP boundary.
//!
//! Every response is a `{success: bool, ...}` envelope. Shared by the server
//! (serialize) and `RemoteGateway` (deserialize).

use serde::{Deserialize, Serialize};

use crate::gateway::{GenerationRequest, GenerationResult};

/// Body of `POST /train`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainRequest {
    #[serde(default)]
    pub style_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_instruction: Option<String>,
}

/// Body of `POST /generate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub style_descriptor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

impl GenerateRequest {
    /// `None` when a required field is missing or blank.
    pub fn into_generation_request(self) -> Option<GenerationRequest> {
        let descriptor = self.style_descriptor.filter(|d| !d.trim().is_empty())?;
        let model_id = self.model_name.filter(|m| !m.trim().is_empty())?;
        Some(GenerationRequest {
            descriptor,
            model_id,
            aspect_ratio: self.aspect_ratio.filter(|a| !a.trim().is_empty()),
            instruction: self.instruction.filter(|i| !i.trim().is_empty()),
            reference_image: self.reference_image.filter(|r| !r.trim().is_empty()),
        })
    }
}

impl From<&GenerationRequest> for GenerateRequest {
    fn from(req: &GenerationRequest) -> Self {
        Self {
            style_descriptor: Some(req.descriptor.clone()),
            reference_image: req.reference_image.clone(),
            instruction: req.instruction.clone(),
            model_name: Some(req.model_id.clone()),
            aspect_ratio: req.aspect_ratio.clone(),
        }
    }
}

/// Uniform response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_image: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn descriptor(descriptor: impl Into<String>) -> Self {
        Self {
            success: true,
            descriptor: Some(descriptor.into()),
            ..Self::default()
        }
    }

    pub fn generated(result: GenerationResult) -> Self {
        match result {
            GenerationResult::Image(image) => Self {
                success: true,
                image: Some(image),
                ..Self::default()
            },
            GenerationResult::TextFallback(text) => Self {
                success: true,
                text: Some(text),
                fallback_image: true,
                ..Self::default()
            },
        }
    }

    pub fn models(models: Vec<String>) -> Self {
        Self {
            success: true,
            models: Some(models),
            ..Self::default()
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            ..Self::default()
        }
    }

    /// Read a generation result back out of a successful envelope.
    pub fn generation_result(&self) -> Option<GenerationResult> {
        if !self.success {
            return None;
        }
        match (&self.image, self.fallback_image) {
            (Some(image), _) => Some(GenerationResult::Image(image.clone())),
            (None, true) => Some(GenerationResult::TextFallback(
                self.text.clone().unwrap_or_default(),
            )),
            (None, false) => None,
        }
    }

    pub fn error_message(&self) -> String {
        self.error.clone().unwrap_or_else(|| "unknown error".to_string())
    }
}
