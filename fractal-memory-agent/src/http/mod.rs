//! Chat HTTP surface (`§6.1`): a thin axum service in front of a single
//! [`AgentFacade`](crate::AgentFacade), serving one fixed user per bound
//! address. CORS defaults to refusing cross-origin requests — callers opt
//! in by naming allowed origins explicitly.

pub mod handlers;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AgentFacade;
use state::AppState;

/// Builds the router. `allowed_origins` empty means no `Access-Control-*`
/// headers are set at all, so browsers refuse cross-origin calls by default.
pub fn build_router(facade: Arc<AgentFacade>, user: String, allowed_origins: &[String]) -> Router {
    let state = AppState { facade, user };

    let mut cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);
    for origin in allowed_origins {
        if let Ok(value) = origin.parse::<axum::http::HeaderValue>() {
            cors = cors.allow_origin(value);
        }
    }

    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/memory/stats", get(handlers::memory_stats))
        .route("/memory/{level}", get(handlers::memory_by_level))
        .route("/memory/consolidate", post(handlers::consolidate))
        .route("/memory/remember", post(handlers::remember))
        .route("/health", get(handlers::health))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

/// Binds and serves until the process is killed. Used by the CLI's `serve`
/// entry point.
pub async fn serve(
    facade: Arc<AgentFacade>,
    user: String,
    addr: SocketAddr,
    allowed_origins: &[String],
) -> std::io::Result<()> {
    let app = build_router(facade, user, allowed_origins);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "chat HTTP surface listening");
    axum::serve(listener, app).await
}
