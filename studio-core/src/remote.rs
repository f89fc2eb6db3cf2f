//! `StyleGateway` that goes through a running studio server.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::envelope::{Envelope, GenerateRequest, TrainRequest};
use crate::gateway::{GatewayError, GenerationRequest, GenerationResult, StyleGateway};

#[derive(Debug, Clone)]
pub struct RemoteGateway {
    client: Client,
    base_url: String,
}

impl RemoteGateway {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST and decode the envelope. Error envelopes come back as `Err(message)`
    /// whatever the HTTP status; a 400 is reported as a validation failure.
    async fn post<B: Serialize>(&self, route: &str, body: &B) -> Result<Envelope, (bool, String)> {
        let url = format!("{}{}", self.base_url, route);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| (false, format!("connection to {} failed: {}", url, e)))?;

        let status = response.status();
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| (false, format!("server returned {} with unreadable body: {}", status, e)))?;

        if envelope.success {
            Ok(envelope)
        } else {
            let message = envelope.error_message();
            tracing::warn!(route, status = status.as_u16(), error = %message, "Studio server refused request");
            Err((status == reqwest::StatusCode::BAD_REQUEST, message))
        }
    }
}

#[async_trait]
impl StyleGateway for RemoteGateway {
    async fn extract_style(
        &self,
        images: &[String],
        instruction: Option<&str>,
    ) -> Result<String, GatewayError> {
        let body = TrainRequest {
            style_images: Some(images.to_vec()),
            training_instruction: instruction.map(str::to_string),
        };

        let envelope = self.post("/train", &body).await.map_err(|(invalid, msg)| {
            if invalid {
                GatewayError::Validation(msg)
            } else {
                GatewayError::ExtractionFailed(msg)
            }
        })?;

        envelope
            .descriptor
            .ok_or_else(|| GatewayError::ExtractionFailed("Failed to analyze style.".to_string()))
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GatewayError> {
        let body = GenerateRequest::from(request);

        let envelope = self.post("/generate", &body).await.map_err(|(invalid, msg)| {
            if invalid {
                GatewayError::Validation(msg)
            } else {
                GatewayError::GenerationFailed(msg)
            }
        })?;

        envelope.generation_result().ok_or_else(|| {
            GatewayError::GenerationFailed("Server response carried neither image nor text".to_string())
        })
    }

    fn name(&self) -> &str {
        "remote"
    }
}
