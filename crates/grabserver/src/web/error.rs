//! Mapping of application errors onto HTTP responses.
//!
//! API routes answer `{"success": false, "error": "..."}`; the download route
//! answers plain text. Internal details (downloader stderr, paths) are logged
//! and replaced by a generic message.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use grabcore::core::process::ProcessError;
use grabcore::core::validation::ValidationError;
use grabcore::AppError;
use serde_json::json;

/// Status and client-facing message of a failed request
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AppError::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn public_message(err: &AppError) -> String {
    match err {
        AppError::Validation(e) => e.to_string(),
        AppError::RateLimited => "Too many requests, please try again later.".to_string(),
        AppError::Http(_) => "Upstream service unavailable.".to_string(),
        AppError::Process(ProcessError::Timeout { .. }) => "The download took too long and was cancelled.".to_string(),
        AppError::Process(ProcessError::Spawn { .. }) => "Downloader is not available on this server.".to_string(),
        AppError::Process(_) => "Failed to fetch the media. Check the URL and try again.".to_string(),
        AppError::Parse(_) => "Could not read media information.".to_string(),
        AppError::EmptyResult(_) => "The download produced no file.".to_string(),
        AppError::Stream(_) | AppError::Io(_) | AppError::Anyhow(_) => "Internal server error.".to_string(),
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = status_for(&err);
        if err.is_client_error() {
            log::debug!("Request rejected [{}]: {}", err.category(), err);
        } else {
            log::error!("Request failed [{}]: {}", err.category(), err);
        }
        Self::new(status, public_message(&err))
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        AppError::from(err).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "success": false, "error": self.message }))).into_response()
    }
}

/// Plain-text error body for the streaming download endpoint
#[derive(Debug)]
pub struct PlainError(pub ApiError);

impl From<ApiError> for PlainError {
    fn from(err: ApiError) -> Self {
        PlainError(err)
    }
}

impl From<AppError> for PlainError {
    fn from(err: AppError) -> Self {
        PlainError(err.into())
    }
}

impl From<ValidationError> for PlainError {
    fn from(err: ValidationError) -> Self {
        PlainError(err.into())
    }
}

impl IntoResponse for PlainError {
    fn into_response(self) -> Response {
        (self.0.status, self.0.message).into_response()
    }
}
