//! Error handling for REST API
//!
//! Maps domain errors onto status codes. Operational failures are logged
//! server-side and surface to clients only as a generic message.

use crate::error::FileManagerError;
use axum::{http::StatusCode, response::IntoResponse, Json};

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Internal(msg) => {
                tracing::error!(details = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal error occurred".to_string())
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

impl From<FileManagerError> for AppError {
    fn from(err: FileManagerError) -> Self {
        let message = err.to_string();
        if err.is_operational() {
            return AppError::Internal(message);
        }

        tracing::warn!("request rejected: {}", message);
        match err {
            FileManagerError::NodeNotFound(_) => AppError::NotFound(message),
            FileManagerError::DuplicateName(_) => AppError::Conflict(message),
            FileManagerError::CyclicMove | FileManagerError::DisallowedExtension(_) => {
                AppError::Unprocessable(message)
            }
            _ => AppError::BadRequest(message),
        }
    }
}
