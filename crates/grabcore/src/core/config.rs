use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Cached yt-dlp binary path
/// Read once at startup from YTDL_BIN environment variable or defaults to "yt-dlp"
pub static YTDL_BIN: Lazy<String> = Lazy::new(|| env::var("YTDL_BIN").unwrap_or_else(|_| "yt-dlp".to_string()));

/// Location of the ffmpeg binary (or the directory containing it)
/// Read from FFMPEG_PATH environment variable
/// When unset, yt-dlp looks ffmpeg up on PATH itself
pub static FFMPEG_PATH: Lazy<Option<String>> =
    Lazy::new(|| env::var("FFMPEG_PATH").ok().filter(|p| !p.trim().is_empty()));

/// Root for per-download working directories
/// Read from TEMP_FILES_DIR environment variable
/// Defaults to the system temp dir, supports tilde (~) expansion
pub static TEMP_FILES_DIR: Lazy<PathBuf> = Lazy::new(|| match env::var("TEMP_FILES_DIR") {
    Ok(dir) if !dir.trim().is_empty() => PathBuf::from(shellexpand::tilde(&dir).to_string()),
    _ => env::temp_dir(),
});

/// Directory with the static frontend (index.html, scripts, styles)
/// Read from PUBLIC_DIR environment variable
/// Default: public
pub static PUBLIC_DIR: Lazy<PathBuf> =
    Lazy::new(|| PathBuf::from(env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string())));

/// Endpoint of the Cobalt-compatible media processing API
/// Read from COBALT_API_URL environment variable
pub static COBALT_API_URL: Lazy<String> =
    Lazy::new(|| env::var("COBALT_API_URL").unwrap_or_else(|_| "https://api.cobalt.tools/".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: grab-server.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "grab-server.log".to_string()));

/// HTTP listen port
/// Read from PORT environment variable
/// Default: 3000
pub static PORT: Lazy<u16> = Lazy::new(|| {
    env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
});

/// Download configuration
pub mod download {
    use super::Duration;

    /// Hard limit for a single yt-dlp invocation (in seconds)
    /// Not reset by progress output
    pub const PROCESS_TIMEOUT_SECS: u64 = 600; // 10 minutes

    /// Upper bound for captured stdout of a monitored download (in bytes)
    pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

    /// Delay between the final 100% event and closing the progress stream (in milliseconds)
    pub const COMPLETION_GRACE_MS: u64 = 2000;

    /// Work directories older than this are considered abandoned (in seconds)
    pub const STALE_WORKDIR_SECS: u64 = 3600;

    /// Prefix of per-download work directories
    pub const WORKDIR_PREFIX: &str = "grab-";

    /// Process timeout duration
    pub fn process_timeout() -> Duration {
        Duration::from_secs(PROCESS_TIMEOUT_SECS)
    }

    /// Completion grace duration
    pub fn completion_grace() -> Duration {
        Duration::from_millis(COMPLETION_GRACE_MS)
    }

    /// Stale work directory age
    pub fn stale_workdir_age() -> Duration {
        Duration::from_secs(STALE_WORKDIR_SECS)
    }
}

/// Rate limiting configuration
pub mod rate_limit {
    use super::Duration;

    /// Requests allowed per client within one window
    pub const MAX_REQUESTS: u32 = 30;

    /// Length of the counting window (in seconds)
    pub const WINDOW_SECS: u64 = 60;

    /// Rate limit window duration
    pub fn window() -> Duration {
        Duration::from_secs(WINDOW_SECS)
    }
}

/// Network configuration
pub mod network {
    use super::Duration;

    /// Request timeout for the external media API (in seconds)
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Request timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(REQUEST_TIMEOUT_SECS)
    }
}

/// Everything the downloader front-end needs, resolved once and passed around explicitly.
#[derive(Debug, Clone)]
pub struct DownloaderSettings {
    /// Downloader binary (name on PATH or absolute path)
    pub ytdl_bin: String,
    /// Optional `--ffmpeg-location` value
    pub ffmpeg_location: Option<String>,
    /// Root for per-download work directories
    pub temp_dir: PathBuf,
    /// Hard timeout for every invocation
    pub timeout: Duration,
    /// Cap for captured stdout during monitored downloads
    pub max_output_bytes: usize,
}

impl DownloaderSettings {
    /// Builds settings from the environment-backed statics above.
    pub fn from_env() -> Self {
        Self {
            ytdl_bin: YTDL_BIN.clone(),
            ffmpeg_location: FFMPEG_PATH.clone(),
            temp_dir: TEMP_FILES_DIR.clone(),
            timeout: download::process_timeout(),
            max_output_bytes: download::MAX_OUTPUT_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_constants() {
        assert_eq!(download::process_timeout(), Duration::from_secs(600));
        assert_eq!(download::MAX_OUTPUT_BYTES, 10_485_760);
        assert!(download::completion_grace() < download::process_timeout());
    }

    #[test]
    fn test_settings_from_env_uses_defaults() {
        let settings = DownloaderSettings::from_env();
        assert!(!settings.ytdl_bin.is_empty());
        assert_eq!(settings.timeout, download::process_timeout());
        assert_eq!(settings.max_output_bytes, download::MAX_OUTPUT_BYTES);
    }
}
