//! The structured error boundary. Internal plumbing propagates `anyhow::Result`;
//! anything that reaches the HTTP/SSE edge converges into `AppError` so the
//! handler layer has one place to decide status code vs SSE `event:error`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("path escape: {0}")]
    PathEscape(String),
    #[error("provider timed out: {0}")]
    ProviderTimeout(String),
    #[error("provider rejected request: {0}")]
    ProviderRejected(String),
    #[error("vector backend error: {0}")]
    VectorBackendError(String),
    #[error("agent step cap exceeded")]
    StepCapExceeded,
    #[error("store error: {0}")]
    StoreError(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::PathEscape(_) => "PATH_ESCAPE",
            AppError::ProviderTimeout(_) => "PROVIDER_TIMEOUT",
            AppError::ProviderRejected(_) => "PROVIDER_REJECTED",
            AppError::VectorBackendError(_) => "VECTOR_BACKEND_ERROR",
            AppError::StepCapExceeded => "STEP_CAP_EXCEEDED",
            AppError::StoreError(_) => "STORE_ERROR",
        }
    }

    /// Serialised payload for an `event:error` SSE frame. Never includes a
    /// stack trace, per the no-raw-trace requirement.
    pub fn to_sse_data(&self) -> String {
        json!({ "kind": self.kind(), "message": self.to_string() }).to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) | AppError::PathEscape(_) => StatusCode::BAD_REQUEST,
            AppError::ProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ProviderRejected(_) => StatusCode::BAD_GATEWAY,
            AppError::VectorBackendError(_) | AppError::StoreError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::StepCapExceeded => StatusCode::OK,
        };

        let body = json!({ "kind": self.kind(), "message": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
