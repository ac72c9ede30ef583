//! # ContentEngine Node
//!
//! HTTP service that turns product images in Google Drive into pin
//! listings.
//!
//! ```bash
//! CONTENTENGINE_DRIVE_TOKEN=... CONTENTENGINE_MODEL_API_KEY=... contentengine-node --port 8080
//! curl -X POST 'http://localhost:8080/launch?posts_per_image=3&keywords=leather'
//! ```

use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod state;

use config::Args;
use state::AppState;

/// Create the API router.
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(api::health::health_check))
        .route("/launch", post(api::launch::launch))
        .route("/list-new", get(api::images::list_new))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("🛑 Shutting down");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 ContentEngine node starting...");
    info!(
        "📁 Folders: new='{}' used='{}' output='{}'",
        args.new_folder, args.used_folder, args.output_folder
    );
    info!("🧠 Model: {} via {}", args.model, args.model_endpoint);

    let pipeline = args.build_pipeline()?;
    let state = AppState::new(pipeline).with_default_posts_per_image(args.default_posts_per_image);
    let app = create_router(state);

    let addr = args.addr()?;
    info!("🌐 Listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
