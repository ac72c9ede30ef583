//! Common types used across ContentEngine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named storage folder standing in for a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderState {
    /// Uploaded images waiting to be processed.
    New,
    /// Images whose listings have all been generated.
    Used,
    /// Parent of the per-image output groups.
    Output,
}

impl FolderState {
    /// Every folder-state a run needs, in resolution order.
    pub const ALL: [FolderState; 3] = [FolderState::New, FolderState::Used, FolderState::Output];

    /// Folder name used when no override is configured.
    pub fn default_name(&self) -> &'static str {
        match self {
            FolderState::New => "new",
            FolderState::Used => "used",
            FolderState::Output => "output",
        }
    }
}

impl fmt::Display for FolderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

/// Pipeline stage at which an image or variant can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Creating or validating the output group.
    Prepare,
    /// Fetching the image content.
    Download,
    /// Calling the model for one variant.
    Generate,
    /// Writing one variant artifact.
    Persist,
    /// Moving the image from `new` to `used`.
    Transition,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Download => "download",
            Stage::Generate => "generate",
            Stage::Persist => "persist",
            Stage::Transition => "transition",
        };
        f.write_str(name)
    }
}

/// Processing status of a single image within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageStatus {
    /// Listed in `new`, nothing done yet.
    Pending,
    /// Waiting on the model for variant `variant` of `of`.
    Generating { variant: u32, of: u32 },
    /// Writing variant `variant` of `of`.
    Persisting { variant: u32, of: u32 },
    /// Every variant is durably stored.
    ReadyToTransition,
    /// Moved to `used`.
    Transitioned,
    /// Stopped; the image stays in `new`.
    Failed { stage: Stage },
}

impl ImageStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImageStatus::Transitioned | ImageStatus::Failed { .. })
    }

    /// Whether moving from `self` to `next` is a legal step.
    ///
    /// Variants only move forward; a variant failure skips ahead to the next
    /// index without passing through `Persisting`.
    pub fn can_advance_to(&self, next: &ImageStatus) -> bool {
        use ImageStatus::*;

        match (self, next) {
            (_, Failed { .. }) => !self.is_terminal(),
            (Pending, Generating { variant, .. }) => *variant >= 1,
            (Pending, ReadyToTransition) => true,
            (Generating { variant: v, of: n }, Persisting { variant: w, of: m }) => v == w && n == m,
            (Generating { variant: v, .. }, Generating { variant: w, .. })
            | (Persisting { variant: v, .. }, Generating { variant: w, .. }) => w > v,
            (Generating { .. }, ReadyToTransition) | (Persisting { .. }, ReadyToTransition) => true,
            (ReadyToTransition, Transitioned) => true,
            _ => false,
        }
    }
}
