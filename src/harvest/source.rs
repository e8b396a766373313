//! Source adapter capability and shared HTTP fetching

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::{Result, ScoutError};
use crate::models::ProxyRecord;

/// One proxy-list source.
///
/// Implementations fetch their payload, drop rows that fail IPv4/port
/// validation and report network or payload-shape problems as source-level
/// errors. They hold no per-run state and may be invoked repeatedly.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable name used for selection, progress events and attribution
    fn name(&self) -> &str;

    /// Fetch and parse up to `page_limit` pages
    async fn harvest(&self, page_limit: u32) -> Result<Vec<ProxyRecord>>;
}

/// HTTP client shared by all network-backed adapters
#[derive(Clone)]
pub struct SourceClient {
    client: Client,
}

impl SourceClient {
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ScoutError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// GET `url` and return the body as text
    #[instrument(skip(self), fields(source = %source_name))]
    pub async fn fetch_text(&self, source_name: &str, url: &str) -> Result<String> {
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(source_name, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::SourceFetch {
                source_name: source_name.to_string(),
                message: format!("HTTP status {}", status),
                transient: status_is_transient(status),
            });
        }

        response
            .text()
            .await
            .map_err(|e| fetch_error(source_name, &e))
    }
}

fn fetch_error(source_name: &str, err: &reqwest::Error) -> ScoutError {
    ScoutError::SourceFetch {
        source_name: source_name.to_string(),
        message: err.to_string(),
        transient: err.is_timeout() || err.is_connect() || err.is_request() || err.is_body(),
    }
}

pub(crate) fn status_is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

pub(crate) fn parse_error(source_name: &str, message: impl Into<String>) -> ScoutError {
    ScoutError::SourceParse {
        source_name: source_name.to_string(),
        message: message.into(),
    }
}
