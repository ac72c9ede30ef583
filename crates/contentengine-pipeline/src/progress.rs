//! Per-image progress tracking.
//!
//! Every status change goes through [`ImageProgress::advance`], which
//! rejects illegal steps. `ReadyToTransition` is only reachable when every
//! variant is persisted, so an image cannot leave `new` with an incomplete
//! output group.

use std::collections::BTreeSet;

use contentengine_core::{EngineError, ImageStatus, Result, Stage};
use tracing::warn;

/// Status and variant bookkeeping for one image.
#[derive(Debug, Clone)]
pub struct ImageProgress {
    image: String,
    variants: u32,
    status: ImageStatus,
    persisted: BTreeSet<u32>,
    first_failure: Option<Stage>,
    titles: Vec<String>,
}

impl ImageProgress {
    pub fn new(image: impl Into<String>, variants: u32) -> Self {
        Self {
            image: image.into(),
            variants,
            status: ImageStatus::Pending,
            persisted: BTreeSet::new(),
            first_failure: None,
            titles: Vec::new(),
        }
    }

    pub fn status(&self) -> ImageStatus {
        self.status
    }

    pub fn is_persisted(&self, variant: u32) -> bool {
        self.persisted.contains(&variant)
    }

    pub fn persisted_count(&self) -> usize {
        self.persisted.len()
    }

    /// Record a variant stored by an earlier run. Only valid before any
    /// generation starts.
    pub fn mark_reused(&mut self, variant: u32) -> Result<()> {
        if self.status != ImageStatus::Pending || variant == 0 || variant > self.variants {
            return Err(self.illegal(&format!("reuse variant {}", variant)));
        }
        self.persisted.insert(variant);
        Ok(())
    }

    pub fn begin_variant(&mut self, variant: u32) -> Result<()> {
        self.advance(ImageStatus::Generating {
            variant,
            of: self.variants,
        })
    }

    pub fn begin_persist(&mut self, variant: u32) -> Result<()> {
        self.advance(ImageStatus::Persisting {
            variant,
            of: self.variants,
        })
    }

    /// Mark the variant in `Persisting` as durably stored.
    pub fn variant_persisted(&mut self, variant: u32, title: &str) -> Result<()> {
        match self.status {
            ImageStatus::Persisting { variant: current, .. } if current == variant => {
                if self.titles.iter().any(|t| t.eq_ignore_ascii_case(title)) {
                    warn!("{} variant {} repeats an earlier title: {}", self.image, variant, title);
                }
                self.titles.push(title.to_string());
                self.persisted.insert(variant);
                Ok(())
            }
            _ => Err(self.illegal(&format!("persist variant {}", variant))),
        }
    }

    /// Note a variant failure. The image keeps going but can no longer complete.
    pub fn variant_failed(&mut self, stage: Stage) {
        self.first_failure.get_or_insert(stage);
    }

    /// Stop the image at `stage`.
    pub fn fail(&mut self, stage: Stage) -> Result<()> {
        self.first_failure.get_or_insert(stage);
        self.advance(ImageStatus::Failed { stage })
    }

    /// Close out variant work: `ReadyToTransition` if every variant is
    /// stored, `Failed` otherwise.
    pub fn finish(&mut self) -> Result<ImageStatus> {
        let complete = (1..=self.variants).all(|v| self.persisted.contains(&v));
        let next = match (complete, self.first_failure) {
            (true, _) => ImageStatus::ReadyToTransition,
            (false, Some(stage)) => ImageStatus::Failed { stage },
            (false, None) => {
                return Err(self.illegal("finish with variants outstanding"));
            }
        };
        self.advance(next)?;
        Ok(self.status)
    }

    pub fn transitioned(&mut self) -> Result<()> {
        self.advance(ImageStatus::Transitioned)
    }

    /// Move to `next` if the status machine allows it.
    pub fn advance(&mut self, next: ImageStatus) -> Result<()> {
        if next == ImageStatus::ReadyToTransition && self.persisted_count() != self.variants as usize {
            return Err(self.illegal("become ready with variants missing"));
        }
        if !self.status.can_advance_to(&next) {
            return Err(self.illegal(&format!("move to {:?}", next)));
        }
        self.status = next;
        Ok(())
    }

    fn illegal(&self, action: &str) -> EngineError {
        EngineError::Internal(format!(
            "{}: cannot {} while {:?}",
            self.image, action, self.status
        ))
    }
}
