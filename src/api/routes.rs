//! API route definitions

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::server::AppState;
use super::websocket;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/status", get(handlers::health::status))
        .route("/ws/events", get(websocket::events::events_ws))
        .nest("/api", pipeline_routes())
        .with_state(state)
}

fn pipeline_routes() -> Router<AppState> {
    Router::new()
        .route("/harvest", post(handlers::harvest::harvest))
        .route("/validate", post(handlers::validate::validate))
        .route("/events/observers", get(handlers::events::list_observers))
        .route("/events/emit", post(handlers::events::emit))
        .route("/events/heartbeat", post(handlers::events::heartbeat))
}
