//! PoW Error Types
//!
//! PoW-specific error variants that integrate with the unified
//! `kernel::error::AppError` system.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

pub type PowResult<T> = Result<T, PowError>;

#[derive(Debug, Error)]
pub enum PowError {
    /// Challenge unknown or already consumed
    #[error("Challenge not found or already used")]
    ChallengeNotFound,

    #[error("Challenge expired")]
    ChallengeExpired,

    /// Hash does not match the challenge or misses the difficulty target
    #[error("Invalid solution: hash does not match challenge or difficulty")]
    InvalidSolution,

    #[error("Difficulty out of range: {0}")]
    InvalidDifficulty(u8),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PowError::ChallengeNotFound | PowError::ChallengeExpired => StatusCode::GONE,
            PowError::InvalidSolution => StatusCode::CONFLICT,
            PowError::InvalidDifficulty(_) => StatusCode::BAD_REQUEST,
            PowError::Database(_) | PowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PowError::ChallengeNotFound | PowError::ChallengeExpired => ErrorKind::Gone,
            PowError::InvalidSolution => ErrorKind::Conflict,
            PowError::InvalidDifficulty(_) => ErrorKind::BadRequest,
            PowError::Database(_) | PowError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    fn log(&self) {
        match self {
            PowError::Database(e) => {
                tracing::error!(error = %e, "PoW database error");
            }
            PowError::Internal(msg) => {
                tracing::error!(message = %msg, "PoW internal error");
            }
            PowError::InvalidSolution => {
                tracing::warn!("PoW invalid solution attempt");
            }
            _ => {
                tracing::debug!(error = %self, "PoW error");
            }
        }
    }
}

impl From<PowError> for AppError {
    fn from(err: PowError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        AppError::new(kind, message)
    }
}

impl IntoResponse for PowError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        // Empty body: verification failures must not explain themselves
        (status, ()).into_response()
    }
}
