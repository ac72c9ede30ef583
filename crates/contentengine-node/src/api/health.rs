//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

/// Liveness response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness check.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "contentengine running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
