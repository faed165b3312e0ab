//! Generation backends: an Ollama-compatible HTTP client and a disabled stub.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use northstar_core::error::GenerationError;
use northstar_core::types::{GenerationRequest, GenerationResponse, ModelSelector};
use northstar_core::Generation;

#[derive(Debug, Deserialize)]
struct GenerateReply {
    #[serde(default)]
    response: String,
}

/// Calls `POST {endpoint}/api/generate` with streaming disabled.
pub struct HttpGeneration {
    http_client: HttpClient,
    endpoint: String,
    primary_model: String,
    fallback_model: String,
    timeout_ms: u64,
}

impl HttpGeneration {
    pub fn new(
        endpoint: impl Into<String>,
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
            timeout_ms,
        }
    }

    pub fn model_for(&self, selector: ModelSelector) -> &str {
        match selector {
            ModelSelector::Primary => &self.primary_model,
            ModelSelector::Fallback => &self.fallback_model,
        }
    }

    fn map_transport(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.timeout_ms)
        } else {
            GenerationError::Transport(e.to_string())
        }
    }
}

/// Client errors that mean the model declined the request.
fn is_refusal(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::UNPROCESSABLE_ENTITY
    )
}

#[async_trait]
impl Generation for HttpGeneration {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let model = self.model_for(request.model_selector);
        let url = format!("{}/api/generate", self.endpoint);
        let body = json!({
            "model": model,
            "prompt": request.prompt,
            "stream": false,
        });

        debug!(model, prompt_chars = request.prompt.len(), "Generation request");

        let response = self
            .http_client
            .post(&url)
            .timeout(Duration::from_millis(self.timeout_ms))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, error_text);
            return Err(if is_refusal(status) {
                GenerationError::Refused(message)
            } else {
                GenerationError::Transport(message)
            });
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("Failed to parse response: {}", e)))?;

        Ok(GenerationResponse {
            text: reply.response,
        })
    }
}

/// Backend used when no endpoint is configured. Every call fails, so the
/// router uses its heuristic and synthesis returns the default answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGeneration;

#[async_trait]
impl Generation for DisabledGeneration {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        Err(GenerationError::Transport("generation disabled".to_string()))
    }
}
