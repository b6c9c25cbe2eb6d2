use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ServiceError;

/// Flat error body: `{"error": code, "message": text}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Failures a handler can return, including the few that only exist at the
/// HTTP boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Admin username is required.")]
    MissingAdmin,

    #[error("Failed to clear conversation.")]
    ClearFailed,

    #[error("No file part in the request.")]
    NoFile,

    #[error("No file selected.")]
    NoFileSelected,

    #[error("Malformed upload: {0}")]
    BadUpload(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Service(e) => e.code(),
            ApiError::MissingAdmin => "missing_admin",
            ApiError::ClearFailed => "clear_failed",
            ApiError::NoFile => "no_file",
            ApiError::NoFileSelected => "no_file_selected",
            ApiError::BadUpload(_) => "invalid_input",
        }
    }

    pub fn status(&self) -> StatusCode {
        let ApiError::Service(e) = self else {
            return StatusCode::BAD_REQUEST;
        };
        match e {
            ServiceError::MissingUsername
            | ServiceError::InvalidInput(_)
            | ServiceError::AlreadyExists(_)
            | ServiceError::InvalidRole(_)
            | ServiceError::EmptyPrompt => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized | ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::UnknownProvider(_)
            | ServiceError::UnknownModel { .. }
            | ServiceError::Upstream { .. }
            | ServiceError::InvalidUpstreamFormat(_)
            | ServiceError::Generation(_)
            | ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Service(ServiceError::Storage(e)) => {
                tracing::error!("Storage failure: {:#}", e);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.code(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}
