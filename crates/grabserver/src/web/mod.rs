//! HTTP layer: API routes, progress stream and the static front-end

pub mod error;
pub mod events;
pub mod rate_limit;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

pub use state::AppState;

/// Front-end pages that all load the single-page app
const SPA_PAGES: &[&str] = &["/shorts", "/video", "/mp3"];

/// Builds the full router.
///
/// Everything under `/api` except the health check goes through the rate limiter;
/// unknown paths fall back to static files.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let limited_api = Router::new()
        .route("/api/info", post(routes::info))
        .route("/api/download", get(routes::download))
        .route("/api/progress/{job_id}", get(events::progress))
        .route("/api/process", post(routes::process))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit::limit));

    let index = state.public_dir.join("index.html");
    let mut router = Router::new().route("/api/health", get(routes::health)).merge(limited_api);
    for page in SPA_PAGES {
        router = router.route_service(page, ServeFile::new(&index));
    }

    router
        .fallback_service(ServeDir::new(&state.public_dir))
        .layer(cors)
        .with_state(state)
}

/// Binds `port` on all interfaces and serves until the process stops.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let public_dir = state.public_dir.clone();
    let app = build_router(state);

    log::info!("Starting web server on http://{}", addr);
    log::info!("  /api/health            - Health check");
    log::info!("  /api/info              - Media info (JSON)");
    log::info!("  /api/download          - Download file");
    log::info!("  /api/progress/{{jobId}}  - Progress stream (SSE)");
    log::info!("  /api/process           - Media API proxy");
    log::info!("  static files from {}", public_dir.display());

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
