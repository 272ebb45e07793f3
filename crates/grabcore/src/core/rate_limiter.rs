use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::core::config;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window rate limiter keyed by client address.
///
/// Each client gets `max_requests` per `window`. The window starts with the
/// first request and resets once it has elapsed.
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Limiter with the default budget (30 requests per minute).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use grabcore::core::rate_limiter::RateLimiter;
    ///
    /// # async fn example() {
    /// let limiter = RateLimiter::new();
    /// if !limiter.check("203.0.113.7").await {
    ///     println!("Too many requests");
    /// }
    /// # }
    /// ```
    pub fn new() -> Self {
        Self::with_limits(config::rate_limit::MAX_REQUESTS, config::rate_limit::window())
    }

    pub fn with_limits(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Counts a request from `key`.
    ///
    /// Returns `true` if the request is allowed, `false` once the budget of the
    /// current window is spent.
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_insert(Window { started: now, count: 0 });

        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }

        if entry.count >= self.max_requests {
            log::debug!("Rate limit hit for {}", key);
            return false;
        }
        entry.count += 1;
        true
    }

    /// Time until `key` may send again, `None` when not limited.
    pub async fn get_remaining_time(&self, key: &str) -> Option<Duration> {
        let windows = self.windows.lock().await;
        let entry = windows.get(key)?;
        let elapsed = Instant::now().duration_since(entry.started);
        if entry.count >= self.max_requests && elapsed < self.window {
            Some(self.window - elapsed)
        } else {
            None
        }
    }

    /// Drops windows that have already expired
    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        windows.retain(|_, w| now.duration_since(w.started) < self.window);
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
