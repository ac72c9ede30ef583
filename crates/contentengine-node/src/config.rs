//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use contentengine_core::{FileId, DEFAULT_POSTS_PER_IMAGE};
use contentengine_drive::{DriveConfig, FolderNames, FolderStateMachine, GoogleDriveStore};
use contentengine_generator::{ArtifactGenerator, ModelConfig, OpenAiChatModel};
use contentengine_pipeline::{Pipeline, PipelineConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "contentengine-node")]
#[command(version)]
#[command(about = "Generates pin titles and descriptions for product images in Google Drive", long_about = None)]
pub struct Args {
    /// Host to bind to
    #[arg(long, env = "CONTENTENGINE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "CONTENTENGINE_PORT", default_value = "3000")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG
    #[arg(long, env = "CONTENTENGINE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Drive metadata API base
    #[arg(long, env = "CONTENTENGINE_DRIVE_API_BASE", default_value = "https://www.googleapis.com/drive/v3")]
    pub drive_api_base: String,

    /// Drive upload API base
    #[arg(long, env = "CONTENTENGINE_DRIVE_UPLOAD_BASE", default_value = "https://www.googleapis.com/upload/drive/v3")]
    pub drive_upload_base: String,

    /// OAuth bearer token with the drive scope
    #[arg(long, env = "CONTENTENGINE_DRIVE_TOKEN", hide_env_values = true)]
    pub drive_token: String,

    /// Only resolve folder-states inside this folder id
    #[arg(long, env = "CONTENTENGINE_DRIVE_ROOT")]
    pub drive_root: Option<String>,

    /// Folder holding images to process
    #[arg(long, env = "CONTENTENGINE_NEW_FOLDER", default_value = "new")]
    pub new_folder: String,

    /// Folder receiving processed images
    #[arg(long, env = "CONTENTENGINE_USED_FOLDER", default_value = "used")]
    pub used_folder: String,

    /// Folder receiving output groups
    #[arg(long, env = "CONTENTENGINE_OUTPUT_FOLDER", default_value = "output")]
    pub output_folder: String,

    /// OpenAI-compatible API base
    #[arg(long, env = "CONTENTENGINE_MODEL_ENDPOINT", default_value = "https://api.openai.com/v1")]
    pub model_endpoint: String,

    /// Vision model name
    #[arg(long, env = "CONTENTENGINE_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Model API key
    #[arg(long, env = "CONTENTENGINE_MODEL_API_KEY", hide_env_values = true)]
    pub model_api_key: String,

    /// Sampling temperature
    #[arg(long, env = "CONTENTENGINE_TEMPERATURE", default_value = "0.9")]
    pub temperature: f32,

    /// Completion token limit
    #[arg(long, env = "CONTENTENGINE_MAX_TOKENS", default_value = "700")]
    pub max_tokens: u32,

    /// HTTP request timeout for Drive and model calls, in seconds
    #[arg(long, env = "CONTENTENGINE_REQUEST_TIMEOUT_SECS", default_value = "90")]
    pub request_timeout_secs: u64,

    /// Upper bound for one pipeline step, retries included, in seconds
    #[arg(long, env = "CONTENTENGINE_CALL_TIMEOUT_SECS", default_value = "300")]
    pub call_timeout_secs: u64,

    /// Model retries after transient transport failures
    #[arg(long, env = "CONTENTENGINE_TRANSPORT_RETRIES", default_value = "2")]
    pub transport_retries: u32,

    /// Base delay between model retries, in milliseconds
    #[arg(long, env = "CONTENTENGINE_RETRY_BACKOFF_MS", default_value = "1200")]
    pub retry_backoff_ms: u64,

    /// posts_per_image used when a launch omits it
    #[arg(long, env = "CONTENTENGINE_DEFAULT_POSTS_PER_IMAGE", default_value_t = DEFAULT_POSTS_PER_IMAGE)]
    pub default_posts_per_image: u32,

    /// Largest accepted posts_per_image
    #[arg(long, env = "CONTENTENGINE_MAX_POSTS_PER_IMAGE", default_value = "10")]
    pub max_posts_per_image: u32,

    /// Images processed at the same time
    #[arg(long, env = "CONTENTENGINE_MAX_CONCURRENT_IMAGES", default_value = "1")]
    pub max_concurrent_images: usize,
}

impl Args {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn drive_config(&self) -> DriveConfig {
        DriveConfig {
            api_base: self.drive_api_base.clone(),
            upload_base: self.drive_upload_base.clone(),
            access_token: self.drive_token.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..DriveConfig::default()
        }
    }

    pub fn folder_names(&self) -> FolderNames {
        FolderNames {
            new: self.new_folder.clone(),
            used: self.used_folder.clone(),
            output: self.output_folder.clone(),
            root: self.drive_root.clone().map(FileId::from),
        }
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            endpoint: self.model_endpoint.clone(),
            api_key: self.model_api_key.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            transport_retries: self.transport_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            max_posts_per_image: self.max_posts_per_image,
            max_concurrent_images: self.max_concurrent_images,
        }
    }

    /// Build the pipeline against Google Drive and the configured model.
    pub fn build_pipeline(&self) -> anyhow::Result<Pipeline> {
        let store = GoogleDriveStore::new(self.drive_config())?;
        let model = OpenAiChatModel::new(self.model_config())?;
        let folders = FolderStateMachine::new(Arc::new(store), self.folder_names());
        Ok(Pipeline::new(
            folders,
            ArtifactGenerator::new(Arc::new(model)),
            self.pipeline_config(),
        ))
    }
}
