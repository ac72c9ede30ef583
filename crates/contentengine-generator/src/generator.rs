//! Artifact generator: one model round trip per variant.

use std::sync::Arc;

use contentengine_core::{EngineError, Listing, Result};
use tracing::{debug, warn};

use crate::model::{ListingModel, ModelRequest};
use crate::prompt::{PromptTemplate, SENTENCE_RANGE};

/// Produces listings for an image by prompting a [`ListingModel`].
#[derive(Clone)]
pub struct ArtifactGenerator {
    model: Arc<dyn ListingModel>,
    template: PromptTemplate,
}

impl ArtifactGenerator {
    pub fn new(model: Arc<dyn ListingModel>) -> Self {
        Self {
            model,
            template: PromptTemplate::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Generate variant `variant` for an image.
    ///
    /// Any failure, whether transport or parsing, is reported as
    /// [`EngineError::Generation`] for that variant.
    pub async fn generate(
        &self,
        image: &[u8],
        mime_type: &str,
        variant: u32,
        keyword_hint: Option<&str>,
    ) -> Result<Listing> {
        let prompt = self.template.render(keyword_hint);
        let request = ModelRequest {
            prompt: &prompt,
            image,
            mime_type,
        };

        let raw = self
            .model
            .complete(request)
            .await
            .map_err(|e| EngineError::generation(variant, e))?;

        let listing = parse_listing(&raw).map_err(|e| EngineError::generation(variant, e))?;

        let sentences = listing.sentence_count();
        if sentences < SENTENCE_RANGE.0 || sentences > SENTENCE_RANGE.1 {
            warn!(
                "Variant {} description has {} sentences, outside {}-{}",
                variant, sentences, SENTENCE_RANGE.0, SENTENCE_RANGE.1
            );
        }
        debug!("Variant {} generated: {}", variant, listing.title);
        Ok(listing)
    }
}

/// Parse a model reply into a [`Listing`].
///
/// The reply must be a JSON object with exactly the string fields `title`
/// and `description`, both non-empty. A surrounding Markdown code fence is
/// tolerated.
pub fn parse_listing(raw: &str) -> Result<Listing> {
    let invalid = EngineError::Serialization;

    let body = strip_code_fence(raw.trim());
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| invalid(format!("response is not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(invalid("response is not a JSON object".to_string()));
    }
    let listing: Listing = serde_json::from_value(value)
        .map_err(|e| invalid(format!("response is not a listing object: {}", e)))?;

    let listing = Listing::new(listing.title.trim(), listing.description.trim());
    if listing.title.is_empty() {
        return Err(invalid("title is empty".to_string()));
    }
    if listing.description.is_empty() {
        return Err(invalid("description is empty".to_string()));
    }
    Ok(listing)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
