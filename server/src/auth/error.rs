//! Authentication Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid credentials (unknown email or wrong password).
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Bad signature, issuer or audience mismatch.
    #[error("Invalid token")]
    InvalidToken,

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// A required claim is missing or has the wrong shape.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Operation needs an authenticated caller.
    #[error("Authentication required")]
    Unauthenticated,

    /// Password hashing error.
    #[error("Password processing failed")]
    PasswordHash,

    /// Token signing error.
    #[error("Token error")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Error response body for JSON responses.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

impl AuthError {
    /// HTTP status and machine-readable code.
    #[must_use]
    pub const fn status(&self) -> (StatusCode, &'static str) {
        match self {
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
            Self::MalformedToken(_) => (StatusCode::UNAUTHORIZED, "MALFORMED_TOKEN"),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "MISSING_AUTH"),
            Self::PasswordHash | Self::Jwt(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let body = Json(ErrorResponse {
            error: code.to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;
