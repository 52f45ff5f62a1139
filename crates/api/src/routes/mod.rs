//! HTTP routes

pub mod health;
pub mod sessions;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{state::AppState, websocket::ws_handler};

/// Create all routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness));

    let api_routes = Router::new()
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:session_id/messages", get(sessions::session_messages));

    let cors = cors_layer(&state.config.client_url);

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let origin = match HeaderValue::from_str(client_url) {
        Ok(value) => AllowOrigin::exact(value),
        Err(e) => {
            tracing::warn!(client_url = %client_url, error = %e, "Invalid CLIENT_URL; allowing any origin");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
}
