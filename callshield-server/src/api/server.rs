//! HTTP server setup and routing
//!
//! Builds the Axum router around a cloneable application context. The
//! webhook and live-view routes are the hot path; everything else is
//! provisioning surface.

use crate::config::Config;
use crate::limiter::RateLimiter;
use crate::store::LiveStore;
use crate::telephony::ProviderClient;
use crate::worker::AdviceDispatcher;
use callshield_common::{Error, Result};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub store: LiveStore,
    pub dispatcher: AdviceDispatcher,
    pub limiter: Arc<RateLimiter>,
    pub telephony: Option<Arc<ProviderClient>>,
    pub config: Arc<Config>,
}

/// Build the application router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Landing + case provisioning
        .route("/", get(super::calls::landing))
        .route("/start", get(super::calls::start_case))
        .route("/t/:slug", get(super::calls::case_page))
        // Health endpoint
        .route("/health", get(super::calls::health))
        // Provider event ingest
        .route("/webhook", post(super::webhook::ingest))
        // Live view read path
        .route("/live", get(super::live::snapshot))
        .route("/events", get(super::sse::event_stream))
        // Out-of-core collaborators
        .route("/call", post(super::calls::place_call))
        .route("/phone", put(super::calls::save_phone))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until shutdown
pub async fn run(ctx: AppContext, port: u16) -> Result<()> {
    let app = create_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Internal(format!("Server error: {e}")))?;

    Ok(())
}
