//! Model collaborator trait and configuration.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use contentengine_core::Result;

/// Configuration for the vision model client.
#[derive(Clone)]
pub struct ModelConfig {
    /// Chat-completions endpoint base, e.g. `https://api.openai.com/v1`.
    pub endpoint: String,

    /// Bearer API key.
    pub api_key: String,

    /// Model identifier.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Upper bound on completion tokens.
    pub max_tokens: u32,

    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,

    /// Retries after transient transport failures.
    pub transport_retries: u32,

    /// Base delay between retries; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.9,
            max_tokens: 700,
            request_timeout: Duration::from_secs(90),
            transport_retries: 2,
            retry_backoff: Duration::from_millis(1200),
        }
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout", &self.request_timeout)
            .field("transport_retries", &self.transport_retries)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

/// One prompt + image round trip.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    /// Text instructions.
    pub prompt: &'a str,

    /// Raw image bytes.
    pub image: &'a [u8],

    /// Content type of `image`.
    pub mime_type: &'a str,
}

/// A vision-capable model that answers with a single text message.
///
/// Calls are independent: implementations must not carry conversation
/// state between requests.
#[async_trait]
pub trait ListingModel: Send + Sync {
    /// Send one user message and return the assistant's text content.
    async fn complete(&self, request: ModelRequest<'_>) -> Result<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
