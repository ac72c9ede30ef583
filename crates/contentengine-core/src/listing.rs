//! Listing artifacts and the output-group manifest.
//!
//! A listing is persisted as `pin_<n>.json` inside the output group of its
//! source image. The manifest `_source.json` ties an output group to the
//! image it was created for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};
use crate::image::ImageRef;

/// MIME type of every artifact written by the pipeline.
pub const ARTIFACT_MIME_TYPE: &str = "application/json";

/// File name of the output-group manifest.
pub const MANIFEST_FILE_NAME: &str = "_source.json";

const ARTIFACT_PREFIX: &str = "pin_";
const ARTIFACT_SUFFIX: &str = ".json";

/// One generated title + description candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Listing {
    /// Purchase-intent title.
    pub title: String,

    /// Four to seven sentence description.
    pub description: String,
}

impl Listing {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    /// Pretty-printed UTF-8 JSON, `title` first.
    pub fn to_artifact_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a stored artifact back into a listing.
    pub fn from_artifact_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Number of sentences in the description, counted by terminal punctuation.
    pub fn sentence_count(&self) -> usize {
        self.description
            .split(|c: char| matches!(c, '.' | '!' | '?'))
            .filter(|s| !s.trim().is_empty())
            .count()
    }
}

/// Artifact file name for a 1-based variant index.
pub fn artifact_name(variant: u32) -> String {
    format!("{ARTIFACT_PREFIX}{variant}{ARTIFACT_SUFFIX}")
}

/// Recover the variant index from an artifact file name.
pub fn parse_artifact_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(ARTIFACT_PREFIX)?.strip_suffix(ARTIFACT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// Record written into each output group naming the image it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputManifest {
    /// Storage id of the source image.
    pub source_id: String,

    /// Source image name at the time the group was created.
    pub source_name: String,

    /// Hex SHA-256 of the image content.
    pub content_sha256: String,

    /// When the group was created.
    pub created_at: DateTime<Utc>,
}

impl OutputManifest {
    /// Build a manifest for `image` with the given content.
    pub fn for_image(image: &ImageRef, content: &[u8]) -> Self {
        Self {
            source_id: image.id.to_string(),
            source_name: image.name.clone(),
            content_sha256: content_digest(content),
            created_at: Utc::now(),
        }
    }

    /// Whether this manifest was written for `image`.
    ///
    /// Only the storage id identifies the owner. Identical bytes under
    /// another id are a different image.
    pub fn matches(&self, image: &ImageRef) -> bool {
        self.source_id == image.id.as_str()
    }

    /// Whether `content` hashes to the recorded digest.
    pub fn same_content(&self, content: &[u8]) -> bool {
        self.content_sha256 == content_digest(content)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| EngineError::Serialization(format!("invalid {MANIFEST_FILE_NAME}: {e}")))
    }
}

/// Hex-encoded SHA-256 of `content`.
pub fn content_digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect()
}
