//! Health and status endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;

/// Liveness probe
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "proxyscout"
        })),
    )
}

/// Runtime summary: uptime, observers and configured sources
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.started_at.elapsed().as_secs(),
        "activeObservers": state.hub.observer_count(),
        "sources": state.sources.names(),
        "testSites": state.config.validation.test_sites,
    }))
}
