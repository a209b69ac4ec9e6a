//! Guard Error Types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use pow::PowError;
use thiserror::Error;

pub type GuardResult<T> = Result<T, GuardError>;

#[derive(Debug, Error)]
pub enum GuardError {
    /// Store unusable at startup; callers continue on defaults
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A store call failed mid-request; callers take their fallback path
    #[error("Store error: {0}")]
    TransientStore(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("Risk scorer failed: {0}")]
    RiskScorer(String),

    #[error(transparent)]
    Pow(#[from] PowError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    pub fn timeout(operation: &'static str) -> Self {
        GuardError::Timeout { operation }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GuardError::Pow(e) => e.kind(),
            GuardError::Timeout { .. } => ErrorKind::RequestTimeout,
            GuardError::TransientStore(_) | GuardError::Store(_) => ErrorKind::ServiceUnavailable,
            GuardError::Configuration(_) | GuardError::RiskScorer(_) | GuardError::Internal(_) => {
                ErrorKind::InternalServerError
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        AppError::new(kind, message)
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        if let GuardError::Pow(err) = self {
            return err.into_response();
        }
        tracing::error!(error = %self, "Guard error");
        (self.status_code(), ()).into_response()
    }
}
