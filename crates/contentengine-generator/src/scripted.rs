//! Scripted model for tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use contentengine_core::{EngineError, Result};

use crate::model::{ListingModel, ModelRequest};

/// What a [`ScriptedModel`] saw on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub prompt: String,
    pub mime_type: String,
    pub image_len: usize,
}

#[derive(Default)]
struct Script {
    queued: VecDeque<Result<String>>,
    fallback: Option<String>,
    requests: Vec<RecordedRequest>,
}

/// A [`ListingModel`] that replays queued replies in order.
///
/// Once the queue is drained it answers with the fallback reply, or fails
/// if none was set.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<Script>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(Script {
                queued: replies.into(),
                ..Script::default()
            }),
            delay: None,
        }
    }

    /// Always answer with `reply`.
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallback(reply)
    }

    pub fn with_fallback(self, reply: impl Into<String>) -> Self {
        self.lock().fallback = Some(reply.into());
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// A well-formed listing reply.
    pub fn listing_json(title: &str, description: &str) -> String {
        serde_json::json!({ "title": title, "description": description }).to_string()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ListingModel for ScriptedModel {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<String> {
        let reply = {
            let mut script = self.lock();
            script.requests.push(RecordedRequest {
                prompt: request.prompt.to_string(),
                mime_type: request.mime_type.to_string(),
                image_len: request.image.len(),
            });
            match script.queued.pop_front() {
                Some(reply) => reply,
                None => script
                    .fallback
                    .clone()
                    .ok_or_else(|| EngineError::Model("script exhausted".to_string())),
            }
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reply
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ModelRequest<'static> {
        ModelRequest {
            prompt: "p",
            image: b"i",
            mime_type: "image/png",
        }
    }

    #[tokio::test]
    async fn test_replays_in_order_then_falls_back() {
        let model = ScriptedModel::new(vec![Ok("a".into()), Err(EngineError::Model("x".into()))])
            .with_fallback("z");

        assert_eq!(model.complete(request()).await.unwrap(), "a");
        assert!(model.complete(request()).await.is_err());
        assert_eq!(model.complete(request()).await.unwrap(), "z");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_script_fails() {
        let model = ScriptedModel::new(Vec::new());
        assert!(model.complete(request()).await.is_err());
    }
}
