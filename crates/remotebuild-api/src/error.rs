//! API error handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::response::{envelope, ResponseStatus};

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Unprocessable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let headers = envelope(ResponseStatus::Error, &message);
        let body = Json(json!({ "message": message }));
        (status, headers, body).into_response()
    }
}

impl From<remotebuild_core::Error> for ApiError {
    fn from(err: remotebuild_core::Error) -> Self {
        use remotebuild_core::Error;

        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::ImageNotFound(_) => ApiError::NotFound("no image available".to_string()),
            Error::NoLogsFound => ApiError::NotFound(err.to_string()),
            Error::JobNotRunning
            | Error::AurNoRepoFound
            | Error::NoUploadTargetData
            | Error::NoValidUploadMethod
            | Error::InvalidInput(_) => ApiError::Unprocessable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<remotebuild_db::DbError> for ApiError {
    fn from(err: remotebuild_db::DbError) -> Self {
        match err {
            remotebuild_db::DbError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
