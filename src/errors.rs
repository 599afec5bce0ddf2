use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidFilter(String),

    #[error("{0}")]
    InvalidWindow(String),

    #[error("amount must equal booking total of {expected} cents, got {got}")]
    AmountMismatch { expected: i64, got: i64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("spot is not available for the requested window")]
    SpotUnavailable,

    #[error("{0}")]
    InvalidTransition(String),

    #[error("payment is already finalized")]
    AlreadyFinalized,

    #[error("{0}")]
    InvalidRefundState(String),

    #[error("{0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code surfaced alongside the human message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "ValidationError",
            AppError::InvalidFilter(_) => "InvalidFilter",
            AppError::InvalidWindow(_) => "InvalidWindow",
            AppError::AmountMismatch { .. } => "AmountMismatch",
            AppError::NotFound(_) => "NotFoundError",
            AppError::SpotUnavailable => "SpotUnavailable",
            AppError::InvalidTransition(_) => "InvalidTransition",
            AppError::AlreadyFinalized => "AlreadyFinalized",
            AppError::InvalidRefundState(_) => "InvalidRefundState",
            AppError::Conflict(_) => "ConflictError",
            AppError::Unauthorized => "Unauthorized",
            AppError::Forbidden(_) => "AuthzError",
            AppError::Internal(_) => "InternalError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidFilter(_)
            | AppError::InvalidWindow(_)
            | AppError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SpotUnavailable
            | AppError::InvalidTransition(_)
            | AppError::AlreadyFinalized
            | AppError::InvalidRefundState(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self {
            tracing::error!(error = %e, "internal error");
        }

        let body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        });
        (self.status(), axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Internal(e.into())
    }
}
