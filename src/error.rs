use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::response::ApiResponse;

/// Errors raised while admitting or serving a request.
#[derive(Error, Debug)]
pub enum GateError {
    /// The counter store answered with an error or could not be reached
    #[error("Counter store error: {0}")]
    Store(String),

    /// The counter store did not answer within the configured bound
    #[error("Counter store timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GateResult<T> = std::result::Result<T, GateError>;

impl From<redis::RedisError> for GateError {
    fn from(err: redis::RedisError) -> Self {
        GateError::Store(err.to_string())
    }
}

impl GateError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::Validation(_) => StatusCode::BAD_REQUEST,
            GateError::Store(_)
            | GateError::StoreTimeout(_)
            | GateError::Configuration(_)
            | GateError::Internal(_)
            | GateError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Store details stay in the logs, callers only learn that we failed.
        let message = match &self {
            GateError::Validation(msg) => msg.clone(),
            _ => "Internal server error".to_string(),
        };
        ApiResponse::<()>::message(status, message).into_response()
    }
}
