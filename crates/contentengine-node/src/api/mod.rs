//! HTTP handlers.

pub mod health;
pub mod images;
pub mod launch;

use serde::Serialize;

/// Body returned in place of a result when a request cannot be served.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}
