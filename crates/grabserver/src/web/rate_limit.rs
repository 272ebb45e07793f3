//! Per-client rate limiting middleware for the API routes

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use grabcore::AppError;

use crate::web::error::ApiError;
use crate::web::state::AppState;

/// Client key: first `X-Forwarded-For` hop, else the peer address
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    if !state.limiter.check(&key).await {
        log::warn!("Rate limit exceeded for {} on {}", key, request.uri().path());
        let mut response = ApiError::from(AppError::RateLimited).into_response();
        if let Some(wait) = state.limiter.get_remaining_time(&key).await {
            // whole seconds, rounded up so an early retry is never invited
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        return response;
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert_eq!(client_key(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_key_falls_back_to_peer() {
        let peer: SocketAddr = "192.0.2.1:5000".parse().unwrap();
        assert_eq!(client_key(&HeaderMap::new(), Some(peer)), "192.0.2.1");
        assert_eq!(client_key(&HeaderMap::new(), None), "unknown");
    }
}
