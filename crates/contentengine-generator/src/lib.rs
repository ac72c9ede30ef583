//! # ContentEngine Generator
//!
//! Listing generation against a vision-capable language model.

pub mod generator;
pub mod model;
pub mod openai;
pub mod prompt;
pub mod scripted;

pub use generator::{parse_listing, ArtifactGenerator};
pub use model::{ListingModel, ModelConfig, ModelRequest};
pub use openai::OpenAiChatModel;
pub use prompt::PromptTemplate;
pub use scripted::ScriptedModel;
