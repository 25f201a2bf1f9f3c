//! # Memex HTTP API Module
//!
//! JSON API over the engine for the conversational, insights and review
//! layers.
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness and version
//! - `GET /stats` - Graph statistics
//! - `POST /entities`, `GET /entities/{id}`, `GET /entities?q=&limit=`
//! - `POST /evidence`, `GET /evidence/{id}`
//! - `POST /relationships`, `GET /relationships/{id}`
//! - `POST /relationships/{id}/contest`, `POST /relationships/{id}/retract`
//! - `GET /relationships/contested` - Prior/current belief pairs
//! - `POST /neighborhood` - Bounded traversal around a center entity
//! - `POST /ingest` - Apply a batch of extracted facts
//!
//! ## Security
//!
//! Bearer-token auth, a global rate limit and CORS are driven by
//! `ServerConfig` (see `crate::config`).

mod auth;
mod handlers;
mod middleware;
pub mod types;

pub use auth::{ApiKey, keys_match};
pub use handlers::ApiError;
pub use middleware::{GlobalRateLimiter, create_rate_limiter};

use crate::config::ServerConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use memex_core::{KnowledgeGraph, MemexError, StorageBackend};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (2 MiB).
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// The engine as served: runtime-selected backend, wall clock.
pub type Engine = KnowledgeGraph<StorageBackend>;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// Writers take the write lock, so mutations are serialised.
    pub graph: Arc<RwLock<Engine>>,
}

impl AppState {
    #[must_use]
    pub fn new(graph: Engine) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// CORS from `cors_origins`: `["*"]` allows any, empty means localhost.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS: allowing ALL origins; do not use this in production");
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(hv) => {
                tracing::info!(origin = %origin, "CORS: allowing origin");
                Some(hv)
            }
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "CORS: invalid origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        if !origins.is_empty() {
            tracing::warn!("CORS: no valid origins configured, defaulting to localhost only");
        }
        return build_localhost_cors();
    }

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Build the router with every endpoint and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing
/// 2. CORS
/// 3. Body limit
/// 4. Rate limiting (if enabled)
/// 5. Authentication (if configured)
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/stats", get(handlers::stats_handler))
        .route(
            "/entities",
            get(handlers::search_entities_handler).post(handlers::upsert_entity_handler),
        )
        .route("/entities/{id}", get(handlers::get_entity_handler))
        .route("/evidence", post(handlers::upsert_evidence_handler))
        .route("/evidence/{id}", get(handlers::get_evidence_handler))
        .route("/relationships", post(handlers::upsert_relationship_handler))
        .route("/relationships/contested", get(handlers::contested_handler))
        .route("/relationships/{id}", get(handlers::get_relationship_handler))
        .route(
            "/relationships/{id}/contest",
            post(handlers::contest_relationship_handler),
        )
        .route(
            "/relationships/{id}/retract",
            post(handlers::retract_relationship_handler),
        )
        .route("/neighborhood", post(handlers::neighborhood_handler))
        .route("/ingest", post(handlers::ingest_handler));

    match server.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            let key: ApiKey = Arc::from(key);
            router = router.layer(axum_middleware::from_fn_with_state(
                key,
                auth::api_key_auth_middleware,
            ));
        }
        None => tracing::warn!(
            "API key authentication DISABLED: every endpoint is public. \
             Set MEMEX_API_KEY to enable it."
        ),
    }

    match create_rate_limiter(server.rate_limit) {
        Some(limiter) => {
            tracing::info!(rps = server.rate_limit, "rate limiting enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                limiter,
                middleware::rate_limit_middleware,
            ));
        }
        None => tracing::info!("rate limiting disabled"),
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(build_cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Bind and serve until Ctrl+C.
pub async fn run_server(graph: Engine, server: &ServerConfig) -> Result<(), MemexError> {
    let addr = server.addr();
    let router = create_router(AppState::new(graph), server);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MemexError::Io(format!("bind {} failed: {}", addr, e)))?;

    tracing::info!(addr = %addr, "memex HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MemexError::Io(format!("server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
