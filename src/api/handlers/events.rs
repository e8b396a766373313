//! Event hub diagnostics

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::server::AppState;
use crate::error::{Result, ScoutError};
use crate::hub::ObserverInfo;
use crate::models::{EventEnvelope, EventPayload, EventSource};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverListing {
    pub total_observers: usize,
    pub observers: Vec<ObserverInfo>,
}

/// Manual emit body: any event payload plus an optional source override
#[derive(Debug, Deserialize)]
pub struct EmitRequest {
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// `GET /api/events/observers`
pub async fn list_observers(State(state): State<AppState>) -> Json<ObserverListing> {
    let observers = state.hub.list_observers();
    Json(ObserverListing {
        total_observers: observers.len(),
        observers,
    })
}

/// `POST /api/events/emit`
pub async fn emit(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<EventEnvelope>)> {
    let request: EmitRequest = serde_json::from_slice(&body)
        .map_err(|e| ScoutError::InvalidRequest(format!("invalid event: {}", e)))?;
    if let EventPayload::ScrapingProgress(progress) = &request.payload {
        if progress.progress > 100 {
            return Err(ScoutError::InvalidRequest(format!(
                "progress must be between 0 and 100, got {}",
                progress.progress
            )));
        }
    }

    let event = match request.source {
        Some(source) => state.hub.emit_from(source, request.payload),
        None => state.hub.emit(request.payload),
    };
    Ok((StatusCode::ACCEPTED, Json(event.as_ref().clone())))
}

/// `POST /api/events/heartbeat` forces a heartbeat tick
pub async fn heartbeat(State(state): State<AppState>) -> Json<Value> {
    let report = state.hub.heartbeat_tick();
    Json(json!({
        "heartbeat": report.heartbeat.as_ref(),
        "activeBefore": report.active_before,
        "evicted": report.evicted,
        "activeObservers": state.hub.observer_count(),
    }))
}
