//! Application state.

use std::sync::Arc;

use contentengine_core::DEFAULT_POSTS_PER_IMAGE;
use contentengine_pipeline::Pipeline;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// The pipeline every launch runs.
    pub pipeline: Arc<Pipeline>,

    /// Variants per image when a launch does not say.
    pub default_posts_per_image: u32,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            default_posts_per_image: DEFAULT_POSTS_PER_IMAGE,
        }
    }

    pub fn with_default_posts_per_image(mut self, posts_per_image: u32) -> Self {
        self.default_posts_per_image = posts_per_image;
        self
    }
}
