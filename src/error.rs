use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use strum::AsRefStr;
use thiserror::Error;

use crate::registry::Ineligible;

/// Stable, machine-checkable error kinds returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    MissingField,
    CodeNotFound,
    AlreadyUsed,
    Expired,
    QuotaExhausted,
    AlreadyActivatedOnDevice,
    BadRequest,
    StorageFailure,
    StorageInconsistency,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Activation code not found")]
    CodeNotFound,

    #[error("Activation code has already been used")]
    AlreadyUsed,

    #[error("Activation code has expired")]
    Expired,

    #[error("Activation limit reached for this code")]
    QuotaExhausted,

    #[error("Activation code is already active on this device")]
    AlreadyActivatedOnDevice,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage inconsistency: {0}")]
    StorageInconsistency(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MissingField(_) => ErrorKind::MissingField,
            AppError::CodeNotFound => ErrorKind::CodeNotFound,
            AppError::AlreadyUsed => ErrorKind::AlreadyUsed,
            AppError::Expired => ErrorKind::Expired,
            AppError::QuotaExhausted => ErrorKind::QuotaExhausted,
            AppError::AlreadyActivatedOnDevice => ErrorKind::AlreadyActivatedOnDevice,
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::Database(_) | AppError::Pool(_) | AppError::Json(_) => {
                ErrorKind::StorageFailure
            }
            AppError::StorageInconsistency(_) => ErrorKind::StorageInconsistency,
        }
    }

    /// Transient failures where resubmitting the whole call is safe.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StorageFailure
    }
}

impl From<Ineligible> for AppError {
    fn from(reason: Ineligible) -> Self {
        match reason {
            Ineligible::AlreadyUsed => AppError::AlreadyUsed,
            Ineligible::Expired => AppError::Expired,
            Ineligible::QuotaExhausted => AppError::QuotaExhausted,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    error: ErrorKind,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MissingField(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::CodeNotFound => StatusCode::NOT_FOUND,
            AppError::AlreadyUsed | AppError::Expired | AppError::QuotaExhausted => {
                StatusCode::FORBIDDEN
            }
            AppError::AlreadyActivatedOnDevice => StatusCode::CONFLICT,
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Json(e) => {
                tracing::error!("Stored JSON error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::StorageInconsistency(msg) => {
                tracing::error!("Storage inconsistency: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // Storage details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            success: false,
            message,
            error: self.kind(),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
