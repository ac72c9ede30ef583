//! OpenAI-compatible chat-completions client with inline image input.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use contentengine_core::{EngineError, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::model::{ListingModel, ModelConfig, ModelRequest};

/// Chat-completions client for vision models.
#[derive(Clone)]
pub struct OpenAiChatModel {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiChatModel {
    /// Create a client from configuration.
    pub fn new(config: ModelConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "Model API key is not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    /// Request body for one prompt + image message.
    pub fn build_payload(&self, request: &ModelRequest<'_>) -> Value {
        let data_url = format!(
            "data:{};base64,{}",
            request.mime_type,
            BASE64.encode(request.image)
        );
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": request.prompt },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }]
        })
    }

    /// One HTTP attempt. Failures are classified so that
    /// [`EngineError::is_retryable`] tells the retry loop whether another
    /// attempt can help.
    async fn post_once(&self, payload: &Value) -> Result<Value> {
        let response = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(&self.config.model, status, body.trim()));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::Serialization(format!("unreadable response body: {}", e)))
    }

    fn transport_error(&self, e: reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout {
                duration_ms: self.config.request_timeout.as_millis() as u64,
                operation: "chat completion".to_string(),
            }
        } else if e.is_connect() || e.is_request() {
            EngineError::Model(format!("request failed: {}", e))
        } else {
            EngineError::Internal(format!("request failed: {}", e))
        }
    }
}

/// Map a non-success status. Throttling and server errors stay retryable;
/// anything else means the request itself was refused.
fn status_error(model: &str, status: StatusCode, body: &str) -> EngineError {
    let message = format!("{} returned {}: {}", model, status, body);
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        EngineError::Model(message)
    } else {
        EngineError::Rejected(message)
    }
}

/// Pull the assistant text out of a chat-completions response.
pub fn extract_message_content(payload: &Value) -> Result<String> {
    let content = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::Model("response has no message content".to_string()))?;
    Ok(content.to_string())
}

#[async_trait]
impl ListingModel for OpenAiChatModel {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<String> {
        let payload = self.build_payload(&request);
        let max_retries = self.config.transport_retries;

        let mut attempt = 0;
        loop {
            match self.post_once(&payload).await {
                Ok(body) => {
                    debug!("{} answered after {} attempt(s)", self.config.model, attempt + 1);
                    return extract_message_content(&body);
                }
                Err(err) => {
                    if !err.is_retryable() || attempt >= max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(
                        "Model transport retry {}/{} after transient failure: {}",
                        attempt, max_retries, err
                    );
                    let delay: Duration = self.config.retry_backoff * attempt;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
