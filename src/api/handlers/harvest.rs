//! Harvest endpoint

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use super::json_body;
use crate::api::server::AppState;
use crate::error::{Result, ScoutError};
use crate::harvest::HarvestOptions;
use crate::models::HarvestReport;

/// `POST /api/harvest` body. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestRequest {
    pub sources: Option<Vec<String>>,
    pub page_limit: Option<u32>,
}

/// Run a harvest over the selected sources and return the merged set
pub async fn harvest(State(state): State<AppState>, body: Bytes) -> Result<Json<HarvestReport>> {
    let request: HarvestRequest = json_body(&body)?;

    let sources = state.sources.select(request.sources.as_deref())?;
    let mut options = HarvestOptions::from(&state.config.harvest);
    if let Some(page_limit) = request.page_limit {
        if page_limit == 0 {
            return Err(ScoutError::InvalidRequest(
                "pageLimit must be at least 1".to_string(),
            ));
        }
        options.page_limit = page_limit;
    }

    info!("Harvest requested for {} sources", sources.len());
    let cancel = state.shutdown.child_token();
    let report = state
        .harvester
        .harvest_all(&sources, &options, &cancel)
        .await?;
    Ok(Json(report))
}
