use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::proxy::{AnonymityLevel, ProxyKey};

/// Outcome of a batch run (harvest or validation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Result of validating one proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub proxy_key: ProxyKey,
    pub is_working: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    pub anonymity_level: AnonymityLevel,
    /// Sites attempted, in configuration order
    pub tested_sites: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tested_at: DateTime<Utc>,
}

/// Summary returned by a validation run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub status: RunStatus,
    pub total: usize,
    pub working_count: usize,
    pub success_rate_percent: f64,
    pub results: Vec<ValidationResult>,
}

impl ValidationReport {
    pub fn new(status: RunStatus, results: Vec<ValidationResult>) -> Self {
        let total = results.len();
        let working_count = results.iter().filter(|r| r.is_working).count();
        let success_rate_percent = if total == 0 {
            0.0
        } else {
            let rate = working_count as f64 / total as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        };
        Self {
            status,
            total,
            working_count,
            success_rate_percent,
            results,
        }
    }

    pub fn working(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.is_working)
    }
}
