//! Input validation utilities
//!
//! Provides validation for user inputs:
//! - Media URL validation (absolute http/https with a host)
//! - Job id validation (short, printable, no separators)

use thiserror::Error;
use url::Url;

/// Maximum accepted job id length
pub const MAX_JOB_ID_LEN: usize = 128;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Invalid URL format or unsupported scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Required field absent from the request
    #[error("Missing field: {0}")]
    Missing(&'static str),

    /// Unknown output format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Job id contains unsupported characters or is too long
    #[error("Invalid job id: {0}")]
    InvalidJobId(String),
}

/// Validates that a URL can be handed to the downloader.
///
/// # Security
/// The URL ends up as a process argument, so only absolute `http`/`https`
/// URLs with a host are accepted; anything that could be read as a flag is not.
///
/// # Examples
/// ```
/// use grabcore::core::validation::validate_media_url;
///
/// assert!(validate_media_url("https://youtube.com/watch?v=dQw4w9WgXcQ").is_ok());
/// assert!(validate_media_url("https://vimeo.com/76979871").is_ok());
///
/// assert!(validate_media_url("ftp://example.com/video").is_err());
/// assert!(validate_media_url("--exec rm").is_err());
/// assert!(validate_media_url("not a url").is_err());
/// ```
pub fn validate_media_url(url: &str) -> Result<Url, ValidationError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing("url"));
    }

    let parsed = Url::parse(trimmed).map_err(|_| ValidationError::InvalidUrl(trimmed.to_string()))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::InvalidUrl(format!(
            "{} (invalid scheme: {})",
            trimmed,
            parsed.scheme()
        )));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidUrl(format!("{} (no host)", trimmed)));
    }

    Ok(parsed)
}

/// Validates a client supplied job id.
///
/// Ids are opaque to the server but end up in logs and URLs, so they are
/// limited to ASCII alphanumerics plus `-` and `_`.
pub fn validate_job_id(job_id: &str) -> Result<&str, ValidationError> {
    let ok = !job_id.is_empty()
        && job_id.len() <= MAX_JOB_ID_LEN
        && job_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if ok {
        Ok(job_id)
    } else {
        Err(ValidationError::InvalidJobId(job_id.chars().take(32).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_media_url("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(validate_media_url("http://youtu.be/abc").is_ok());
        assert!(validate_media_url("  https://soundcloud.com/a/b  ").is_ok());
    }

    #[test]
    fn test_invalid_scheme() {
        let err = validate_media_url("file:///etc/passwd").unwrap_err();
        assert!(err.to_string().contains("invalid scheme"));
    }

    #[test]
    fn test_empty_url() {
        assert!(matches!(validate_media_url("   "), Err(ValidationError::Missing("url"))));
    }

    #[test]
    fn test_flag_like_input_rejected() {
        assert!(validate_media_url("-o /tmp/x").is_err());
    }

    #[test]
    fn test_job_ids() {
        assert!(validate_job_id("job-123_abc").is_ok());
        assert!(validate_job_id("").is_err());
        assert!(validate_job_id("../etc").is_err());
        assert!(validate_job_id(&"a".repeat(MAX_JOB_ID_LEN + 1)).is_err());
    }
}
