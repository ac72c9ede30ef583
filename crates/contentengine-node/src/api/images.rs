//! Pending image listing.

use axum::{extract::State, Json};
use serde::Serialize;

use super::ErrorResponse;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(untagged)]
pub enum PendingResponse {
    Images(Vec<String>),
    Error(ErrorResponse),
}

/// Names of the images waiting in `new`.
pub async fn list_new(State(state): State<AppState>) -> Json<PendingResponse> {
    match state.pipeline.pending_images().await {
        Ok(names) => Json(PendingResponse::Images(names)),
        Err(e) => Json(PendingResponse::Error(ErrorResponse::new(e))),
    }
}
