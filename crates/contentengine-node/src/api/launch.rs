//! Pipeline launch endpoint.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use contentengine_core::{RunRequest, RunResult};
use contentengine_pipeline::CancelSignal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::ErrorResponse;
use crate::state::AppState;

/// Query parameters for `POST /launch`.
#[derive(Debug, Default, Deserialize)]
pub struct LaunchParams {
    pub posts_per_image: Option<u32>,
    pub keywords: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LaunchResponse {
    Summary(RunResult),
    Error(ErrorResponse),
}

/// Cancels the run if the request goes away before it finishes.
struct CancelOnDrop(watch::Sender<bool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let _ = self.0.send(true);
    }
}

/// Run the pipeline once and report what happened.
///
/// Always answers 200: a summary, or `{error}` when the run could not start.
pub async fn launch(
    State(state): State<AppState>,
    params: Result<Query<LaunchParams>, QueryRejection>,
) -> Json<LaunchResponse> {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            warn!("Rejected launch: {}", rejection.body_text());
            return Json(LaunchResponse::Error(ErrorResponse::new(rejection.body_text())));
        }
    };

    let request = RunRequest::new(
        params.posts_per_image.unwrap_or(state.default_posts_per_image),
        params.keywords.unwrap_or_default(),
    );
    info!(
        "📥 Launch: {} post(s) per image, keywords: {:?}",
        request.posts_per_image, request.keywords
    );

    let (tx, cancel) = CancelSignal::channel();
    let _guard = CancelOnDrop(tx);
    let pipeline = state.pipeline.clone();
    let run = tokio::spawn(async move { pipeline.run_with_cancel(&request, cancel).await });

    match run.await {
        Ok(Ok(result)) => Json(LaunchResponse::Summary(result)),
        Ok(Err(e)) => {
            if e.is_fatal() {
                warn!("Launch refused: {}", e);
            } else {
                error!("Launch failed: {}", e);
            }
            Json(LaunchResponse::Error(ErrorResponse::new(e)))
        }
        Err(e) => Json(LaunchResponse::Error(ErrorResponse::new(format!("run aborted: {}", e)))),
    }
}
