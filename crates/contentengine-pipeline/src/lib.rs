//! # ContentEngine Pipeline
//!
//! Drives images from `new` through generation and persistence to `used`.
//!
//! ```text
//! new ──download──► output/<base>/_source.json
//!                   output/<base>/pin_1.json .. pin_N.json
//!     ──all N stored──► used
//! ```

pub mod cancel;
pub mod orchestrator;
pub mod persistence;
pub mod progress;

pub use cancel::CancelSignal;
pub use orchestrator::{Pipeline, PipelineConfig};
pub use persistence::{ArtifactStore, OutputGroup};
pub use progress::ImageProgress;
