//! Validation endpoint

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::Value;
use tracing::info;

use crate::api::server::AppState;
use crate::error::{Result, ScoutError};
use crate::models::ValidationReport;
use crate::validator::{ValidationOptions, ValidationRequest};

/// Validate a batch of records. The body shape is checked before any
/// network traffic.
pub async fn validate(State(state): State<AppState>, body: Bytes) -> Result<Json<ValidationReport>> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| ScoutError::InvalidRequest(format!("invalid JSON body: {}", e)))?;
    let request = ValidationRequest::from_json(body)?;

    let mut options = ValidationOptions::from(&state.config.validation);
    if let Some(test_sites) = request.test_sites {
        options.test_sites = test_sites;
    }

    info!("Validation requested for {} records", request.records.len());
    let cancel = state.shutdown.child_token();
    let report = state
        .validator
        .validate(request.records, &options, &cancel)
        .await?;
    Ok(Json(report))
}
