use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::batch::BatchError;
use crate::vision::VisionError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("Vision features are not configured")]
    VisionUnavailable,

    #[error("Vision service request failed")]
    Upstream,

    #[error("Vision service returned an unreadable response")]
    MalformedResponse,

    #[error("Database operation failed")]
    Persistence(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::VisionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream | AppError::MalformedResponse | AppError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Persistence(detail) = self {
            error!(%detail, "persistence failure");
        }
        HttpResponse::build(self.status_code()).json(json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => AppError::NotFound("Product not found".to_string()),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                AppError::Persistence(format!("duplicate key: {}", info.message()))
            }
            other => AppError::Persistence(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Persistence(format!("connection pool: {err}"))
    }
}

impl From<BatchError> for AppError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::InvalidPrefix(_) | BatchError::InvalidIndex(_) | BatchError::Exhausted(_) => {
                AppError::Validation(err.to_string())
            }
            BatchError::Io(_) | BatchError::Corrupt(_) => AppError::Persistence(err.to_string()),
        }
    }
}

impl From<VisionError> for AppError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::NotConfigured => AppError::VisionUnavailable,
            VisionError::InvalidImage(msg) => AppError::Validation(msg),
            VisionError::Upstream(detail) => {
                error!(%detail, "vision upstream failure");
                AppError::Upstream
            }
            VisionError::MalformedResponse => AppError::MalformedResponse,
        }
    }
}
