//! Gateway Error Types
//!
//! Gateway-specific error variants that integrate with the unified
//! `kernel::error::AppError` system. Security failures fail closed and
//! never explain themselves to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, conversions::classify_sqlx, kind::ErrorKind};
use thiserror::Error;

/// Gateway result type alias
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Why an OTP verification failed. Logged, never shown to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtpFailure {
    #[error("no active token")]
    NoActiveToken,

    #[error("token expired")]
    Expired,

    #[error("attempts exhausted")]
    AttemptsExhausted,

    #[error("code mismatch")]
    Mismatch,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or malformed request field
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Double-submit CSRF check failed
    #[error("CSRF token missing or mismatched")]
    CsrfRejected,

    /// Session cookie absent, tampered or expired
    #[error("Session invalid")]
    SessionInvalid,

    /// Fixed window exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("OTP verification failed: {0}")]
    Otp(OtpFailure),

    /// Mail delivery failed (absorbed by callers)
    #[error("Mail delivery failed: {0}")]
    Mail(String),

    /// Upstream identity lookup failed (absorbed by callers)
    #[error("Identity resolution failed: {0}")]
    Identity(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Status when the error is rendered on its own.
    ///
    /// `Otp` is the one variant whose status is not `kind()`'s: it always
    /// renders as the generic 200 failure body.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Otp(_) => StatusCode::OK,
            _ => StatusCode::from_u16(self.kind().status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    /// Classification used for logging and problem details. A failed code is
    /// the caller's fault, so `Otp` is a client error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) | GatewayError::SessionInvalid | GatewayError::Otp(_) => {
                ErrorKind::BadRequest
            }
            GatewayError::CsrfRejected => ErrorKind::Forbidden,
            GatewayError::RateLimited => ErrorKind::TooManyRequests,
            GatewayError::Database(e) => classify_sqlx(e).0,
            GatewayError::Mail(_) | GatewayError::Identity(_) | GatewayError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    /// Client-facing form. Server-side details stay out of the message.
    pub fn into_app_error(self) -> AppError {
        match self {
            GatewayError::Validation(msg) => AppError::bad_request(msg),
            GatewayError::SessionInvalid => AppError::bad_request("Sign-in session expired")
                .with_action("Restart sign-in from the authorization page"),
            GatewayError::CsrfRejected => AppError::forbidden("Request rejected"),
            GatewayError::RateLimited => AppError::too_many_requests("Too many requests")
                .with_action("Wait a few minutes and try again"),
            GatewayError::Otp(_) => AppError::bad_request("Invalid code"),
            GatewayError::Database(e) => AppError::from(e),
            other => AppError::internal("Internal error").with_source(other),
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            GatewayError::Database(e) => {
                tracing::error!(error = %e, kind = %self.kind(), "Gateway database error");
            }
            GatewayError::Internal(msg) | GatewayError::Mail(msg) | GatewayError::Identity(msg) => {
                tracing::error!(message = %msg, "Gateway internal error");
            }
            GatewayError::CsrfRejected => {
                tracing::warn!("CSRF check rejected request");
            }
            GatewayError::RateLimited => {
                tracing::warn!("Rate limit exceeded");
            }
            _ => {
                tracing::debug!(error = %self, "Gateway error");
            }
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        err.into_app_error()
    }
}

impl From<OtpFailure> for GatewayError {
    fn from(reason: OtpFailure) -> Self {
        GatewayError::Otp(reason)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.log();
        if let GatewayError::Otp(_) = self {
            return crate::presentation::dto::VerifyCodeResponse::failure().into_response();
        }
        self.into_app_error().into_response()
    }
}
