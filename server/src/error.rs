//! Caller-facing error taxonomy.
//!
//! Every service operation returns [`ServiceError`], which maps onto an HTTP
//! status with a `{ "error", "message" }` JSON body.

use axum::http::header::HeaderValue;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::auth::{AuthError, ErrorResponse};
use crate::db::StorageError;
use crate::permissions::EvaluationError;
use crate::problems::FieldError;
use crate::ratelimit::RateLimitError;

/// Service error types.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing, invalid, expired or malformed token, or bad credentials.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Authorization evaluated to false.
    #[error("Forbidden")]
    Forbidden,

    /// Bad input shape or value.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found")]
    NotFound,

    /// Registration limit reached for this source address.
    #[error("Too many requests, retry in {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// A permission decision could not be reached.
    #[error("Authorization evaluation failed")]
    Evaluation(#[from] EvaluationError),

    #[error("Storage error")]
    Storage(#[from] StorageError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(StorageError::Database(e))
    }
}

impl From<RateLimitError> for ServiceError {
    fn from(e: RateLimitError) -> Self {
        Self::RateLimited {
            retry_after: e.retry_after(),
        }
    }
}

impl From<FieldError> for ServiceError {
    fn from(e: FieldError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

impl ServiceError {
    /// HTTP status and machine-readable code.
    #[must_use]
    pub const fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Auth(e) => e.status(),
            Self::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Evaluation(_) | Self::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        if status.is_server_error() {
            error!(error = ?self, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });
        let mut response = (status, body).into_response();

        if let Self::RateLimited { retry_after } = self {
            if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", v);
            }
        }
        response
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ServiceError::Auth(AuthError::InvalidToken), StatusCode::UNAUTHORIZED),
            (
                ServiceError::Auth(AuthError::MalformedToken("x".into())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServiceError::Auth(AuthError::PasswordHash),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServiceError::Forbidden, StatusCode::FORBIDDEN),
            (ServiceError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
            (
                ServiceError::RateLimited { retry_after: 5 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ServiceError::Storage(StorageError::Busy(std::time::Duration::from_secs(1))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status().0, expected, "{err:?}");
        }
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ServiceError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
    }
}
