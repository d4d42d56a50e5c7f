use crate::services::{media_service::MediaError, remote_store::StoreError};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        let status = match &err {
            MediaError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MediaError::StoreUnavailable(StoreError::BucketNotFound(_))
            | MediaError::StoreUnavailable(StoreError::ObjectNotFound(_)) => StatusCode::NOT_FOUND,
            MediaError::StoreUnavailable(StoreError::Unsupported(_)) => {
                StatusCode::NOT_IMPLEMENTED
            }
            // The bucket itself cannot take image slim; fixing it is an operator step.
            MediaError::StoreUnavailable(
                StoreError::OfsBucket(_)
                | StoreError::ImageServiceNotBound(_)
                | StoreError::RegionUnsupported(_),
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            MediaError::StoreUnavailable(_) => StatusCode::BAD_GATEWAY,
            MediaError::NameAllocationExhausted { .. } => StatusCode::CONFLICT,
            MediaError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        MediaError::from(err).into()
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::bad_request(err.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        MediaError::from(err).into()
    }
}
