//! Run requests and run summaries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::types::Stage;

/// Variants generated per image when the caller does not say.
pub const DEFAULT_POSTS_PER_IMAGE: u32 = 2;

/// Parameters of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Number of listings (variants) to generate for every image.
    pub posts_per_image: u32,

    /// Optional keyword hint woven into the prompt.
    pub keywords: String,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            posts_per_image: DEFAULT_POSTS_PER_IMAGE,
            keywords: String::new(),
        }
    }
}

impl RunRequest {
    pub fn new(posts_per_image: u32, keywords: impl Into<String>) -> Self {
        Self {
            posts_per_image,
            keywords: keywords.into(),
        }
    }

    /// Reject requests that could never complete an image.
    pub fn validate(&self, max_posts_per_image: u32) -> Result<()> {
        if self.posts_per_image == 0 {
            return Err(EngineError::InvalidRequest(
                "posts_per_image must be at least 1".to_string(),
            ));
        }
        if self.posts_per_image > max_posts_per_image {
            return Err(EngineError::InvalidRequest(format!(
                "posts_per_image {} exceeds the limit of {}",
                self.posts_per_image, max_posts_per_image
            )));
        }
        Ok(())
    }

    /// Keyword hint with surrounding whitespace removed, if any.
    pub fn keyword_hint(&self) -> Option<&str> {
        let trimmed = self.keywords.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// A single failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Image name. Empty when the failure concerns the whole run.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Variant index, when the failure belongs to one variant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<u32>,

    /// Stage at which processing stopped.
    pub stage: Stage,

    /// Human-readable cause.
    pub reason: String,
}

impl FailureRecord {
    pub fn image(image: impl Into<String>, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            variant: None,
            stage,
            reason: reason.into(),
        }
    }

    /// A failure that stopped the run before any image was attempted.
    pub fn run(stage: Stage, reason: impl Into<String>) -> Self {
        Self::image(String::new(), stage, reason)
    }

    /// Whether this failure belongs to the run rather than to one image.
    pub fn is_run_level(&self) -> bool {
        self.image.is_empty()
    }

    pub fn variant(image: impl Into<String>, variant: u32, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            variant: Some(variant),
            stage,
            reason: reason.into(),
        }
    }
}

/// Summary of one run. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Identifier for correlating logs with this summary.
    pub run_id: Uuid,

    /// Images moved to `used`, in listing order.
    pub processed: Vec<String>,

    /// Every isolated failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRecord>,

    /// Whether the caller cancelled the run before it finished.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl RunResult {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            processed: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    /// Failures recorded for `image`.
    pub fn failures_for<'a>(&'a self, image: &'a str) -> impl Iterator<Item = &'a FailureRecord> + 'a {
        self.failures.iter().filter(move |f| f.image == image)
    }

    /// Returns true if nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = RunRequest::default();
        assert_eq!(request.posts_per_image, 2);
        assert_eq!(request.keyword_hint(), None);
    }

    #[test]
    fn test_request_validation() {
        assert!(RunRequest::new(0, "").validate(10).is_err());
        assert!(RunRequest::new(11, "").validate(10).is_err());
        assert!(RunRequest::new(10, "").validate(10).is_ok());
    }

    #[test]
    fn test_keyword_hint_is_trimmed() {
        assert_eq!(RunRequest::new(1, "  boho summer ").keyword_hint(), Some("boho summer"));
        assert_eq!(RunRequest::new(1, "   ").keyword_hint(), None);
    }

    #[test]
    fn test_clean_result_serializes_processed_only() {
        let mut result = RunResult::new(Uuid::nil());
        result.processed.push("shoe.jpg".to_string());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["processed"], serde_json::json!(["shoe.jpg"]));
        assert!(value.get("failures").is_none());
        assert!(value.get("cancelled").is_none());
    }

    #[test]
    fn test_failure_record_shape() {
        let mut result = RunResult::new(Uuid::nil());
        result.failures.push(FailureRecord::variant("shoe.jpg", 2, Stage::Generate, "invalid JSON"));
        result.failures.push(FailureRecord::image("hat.png", Stage::Transition, "403"));

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value["failures"][0],
            serde_json::json!({"image": "shoe.jpg", "variant": 2, "stage": "generate", "reason": "invalid JSON"})
        );
        assert!(value["failures"][1].get("variant").is_none());
        assert_eq!(result.failures_for("shoe.jpg").count(), 1);
        assert!(!result.is_clean());
    }

    #[test]
    fn test_run_level_failure_has_no_image() {
        let failure = FailureRecord::run(Stage::Prepare, "listing refused");
        assert!(failure.is_run_level());
        assert!(!FailureRecord::image("shoe.jpg", Stage::Prepare, "x").is_run_level());

        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value, serde_json::json!({"stage": "prepare", "reason": "listing refused"}));
    }
}
