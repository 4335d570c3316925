use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;

use crate::{
    data_collector::CollectorError, repository::RepositoryError, responses::ApiResponse,
    storage::StorageError,
};

/// AppError
///
/// Every failure a handler or middleware can surface, other than the 401
/// family, which is rendered by the unauthorized responder alone. Each variant
/// maps to a fixed status and message in the standard envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("access denied")]
    AccessDenied,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(Value),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("rate limit exceeded")]
    TooManyRequests,
}

impl AppError {
    /// Shorthand for a single-message validation failure.
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Validation(Value::String(detail.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::EXPECTATION_FAILED,
            Self::Upstream(_) | Self::Storage(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Invalid authorization parameters",
            Self::NotFound(_) => "Resource not found",
            Self::Validation(_) => "Validation failed",
            Self::Conflict(_) => "Resource already exists",
            Self::Upstream(_) => "Internal proxy error",
            Self::Storage(_) => "Internal storage error",
            Self::Database(_) => "An unexpected error occurred",
            Self::TooManyRequests => "Too many requests",
        }
    }

    fn detail(self) -> Value {
        match self {
            Self::AccessDenied => Value::from(
                "You don't have the rights to access the resource or check the JWT and CSRF Tokens",
            ),
            Self::TooManyRequests => Value::from("Rate limit exceeded"),
            Self::Validation(errors) => errors,
            Self::NotFound(detail)
            | Self::Conflict(detail)
            | Self::Upstream(detail)
            | Self::Storage(detail)
            | Self::Database(detail) => Value::String(detail),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let message = self.message();
        let body = ApiResponse::<()>::error(message, self.detail());
        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(detail) => Self::NotFound(detail),
            RepositoryError::Duplicate(detail) => Self::Conflict(detail),
            RepositoryError::InvalidSort(field) => {
                Self::invalid(format!("Unsupported sort field: {field}"))
            }
            RepositoryError::Sqlx(e) => Self::Database(e.to_string()),
            RepositoryError::Corrupt(detail) => Self::Database(detail),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<CollectorError> for AppError {
    fn from(err: CollectorError) -> Self {
        Self::Upstream(err.to_string())
    }
}
