use thiserror::Error;

use crate::core::process::ProcessError;
use crate::core::validation::ValidationError;

/// Centralized error types for the application
///
/// Everything the download pipeline can fail with ends up here, so the HTTP layer
/// has a single type to map onto responses.
///
/// # Example
///
/// ```no_run
/// use grabcore::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// The downloader could not be started, failed, or timed out
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Info query output was not a valid JSON document
    #[error("Failed to parse downloader output: {0}")]
    Parse(#[from] serde_json::Error),

    /// The downloader exited successfully but left no output file
    #[error("Download produced no file: {0}")]
    EmptyResult(String),

    /// File transfer to the client was interrupted
    #[error("Stream error: {0}")]
    Stream(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP/Fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Client exceeded its request budget
    #[error("Too many requests")]
    RateLimited,

    /// Anyhow errors (for general error handling)
    #[error("Application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    /// Short category name for logs
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Process(ProcessError::Spawn { .. }) => "spawn",
            AppError::Process(ProcessError::Failed { .. }) => "process",
            AppError::Process(ProcessError::Timeout { .. }) => "timeout",
            AppError::Process(ProcessError::Io(_)) => "process_io",
            AppError::Parse(_) => "parse",
            AppError::EmptyResult(_) => "empty_result",
            AppError::Stream(_) => "stream",
            AppError::Io(_) => "io",
            AppError::Http(_) => "http",
            AppError::Validation(_) => "validation",
            AppError::RateLimited => "rate_limited",
            AppError::Anyhow(_) => "other",
        }
    }

    /// Whether the failure was caused by the request itself rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::RateLimited)
    }
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
