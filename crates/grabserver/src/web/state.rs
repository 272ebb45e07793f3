//! Shared state injected into every handler

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use grabcore::config::{self, DownloaderSettings};
use grabcore::core::rate_limiter::RateLimiter;
use grabcore::JobRegistry;

/// Application state shared across all handlers.
///
/// Owned by the server lifecycle; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<DownloaderSettings>,
    pub registry: JobRegistry,
    pub limiter: RateLimiter,
    pub http: reqwest::Client,
    /// Cobalt-compatible media API endpoint for `/api/process`
    pub cobalt_url: String,
    /// Static front-end files
    pub public_dir: PathBuf,
    /// Delay before a finished job's progress stream is closed
    pub completion_grace: Duration,
}

impl AppState {
    pub fn new(settings: DownloaderSettings, public_dir: PathBuf, cobalt_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config::network::timeout())
            .build()?;

        Ok(Self {
            settings: Arc::new(settings),
            registry: JobRegistry::new(),
            limiter: RateLimiter::new(),
            http,
            cobalt_url: cobalt_url.into(),
            public_dir,
            completion_grace: config::download::completion_grace(),
        })
    }

    /// State built from the environment-backed configuration
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(
            DownloaderSettings::from_env(),
            config::PUBLIC_DIR.clone(),
            config::COBALT_API_URL.as_str(),
        )
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_completion_grace(mut self, grace: Duration) -> Self {
        self.completion_grace = grace;
        self
    }
}
