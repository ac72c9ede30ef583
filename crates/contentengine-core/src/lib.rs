//! # ContentEngine Core
//!
//! Core types shared by every ContentEngine crate.
//!
//! This crate provides the fundamental building blocks:
//! - [`ImageRef`] - An image sitting in a folder-state
//! - [`Listing`] - One generated title + description
//! - [`RunRequest`] / [`RunResult`] - Input and summary of a pipeline run
//! - [`EngineError`] - Error taxonomy

pub mod error;
pub mod image;
pub mod listing;
pub mod run;
pub mod types;

// Re-exports for convenience
pub use error::{EngineError, Result};
pub use image::{base_name, is_image_mime, FileId, ImageRef, FOLDER_MIME_TYPE, IMAGE_MIME_PREFIX};
pub use listing::{
    artifact_name, content_digest, parse_artifact_name, Listing, OutputManifest, ARTIFACT_MIME_TYPE,
    MANIFEST_FILE_NAME,
};
pub use run::{FailureRecord, RunRequest, RunResult, DEFAULT_POSTS_PER_IMAGE};
pub use types::*;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{EngineError, Result};
    pub use crate::image::{FileId, ImageRef};
    pub use crate::listing::Listing;
    pub use crate::run::{FailureRecord, RunRequest, RunResult};
    pub use crate::types::{FolderState, ImageStatus, Stage};
}
