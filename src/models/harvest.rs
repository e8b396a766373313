use serde::Serialize;
use std::collections::BTreeMap;

use super::proxy::{ProxyProtocol, ProxyRecord};
use super::validation::RunStatus;

/// How one source resolved during a harvest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Succeeded,
    Failed,
    Timeout,
    Cancelled,
}

/// Per-source result of a harvest
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub source: String,
    pub status: SourceStatus,
    /// Records returned by the adapter before deduplication
    pub raw_count: usize,
    /// Records in the deduplicated set attributed to this source
    pub unique_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        self.status == SourceStatus::Succeeded
    }
}

/// Source-level failure listed in a harvest response
#[derive(Debug, Clone, Serialize)]
pub struct SourceError {
    pub source: String,
    pub error: String,
}

/// Aggregate result of a harvest run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestReport {
    pub status: RunStatus,
    pub total: usize,
    pub per_protocol_counts: BTreeMap<ProxyProtocol, usize>,
    pub records: Vec<ProxyRecord>,
    pub sources: Vec<SourceOutcome>,
    pub errors: Vec<SourceError>,
}

impl HarvestReport {
    pub fn new(status: RunStatus, records: Vec<ProxyRecord>, sources: Vec<SourceOutcome>) -> Self {
        let mut per_protocol_counts = BTreeMap::new();
        for record in &records {
            *per_protocol_counts.entry(record.protocol).or_insert(0) += 1;
        }
        let errors = sources
            .iter()
            .filter_map(|outcome| {
                outcome.error.as_ref().map(|error| SourceError {
                    source: outcome.source.clone(),
                    error: error.clone(),
                })
            })
            .collect();

        Self {
            status,
            total: records.len(),
            per_protocol_counts,
            records,
            sources,
            errors,
        }
    }

    pub fn succeeded_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.is_success()).count()
    }
}
