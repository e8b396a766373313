//! Paginated JSON proxy API (geonode layout)

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::source::{parse_error, SourceAdapter, SourceClient};
use crate::error::Result;
use crate::models::{AnonymityLevel, ProxyProtocol, ProxyRecord};

pub const GEONODE_URL: &str = "https://proxylist.geonode.com/api/proxy-list";

const PAGE_SIZE: u32 = 500;

/// Source backed by a paginated `{data: [...]}` JSON API
pub struct JsonApiSource {
    name: String,
    base_url: String,
    page_size: u32,
    client: SourceClient,
}

impl JsonApiSource {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, client: SourceClient) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            page_size: PAGE_SIZE,
            client,
        }
    }

    pub fn geonode(client: SourceClient) -> Self {
        Self::new("geonode", GEONODE_URL, client)
    }

    fn page_url(&self, page: u32) -> String {
        format!(
            "{}?limit={}&page={}&sort_by=lastChecked&sort_type=desc",
            self.base_url, self.page_size, page
        )
    }
}

#[async_trait]
impl SourceAdapter for JsonApiSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn harvest(&self, page_limit: u32) -> Result<Vec<ProxyRecord>> {
        let mut records = Vec::new();

        for page in 1..=page_limit.max(1) {
            let fetched = match self.client.fetch_text(&self.name, &self.page_url(page)).await {
                Ok(body) => parse_json_page(&body, &self.name),
                Err(e) => Err(e),
            };
            // Later pages only shorten the result; the first page decides success
            let parsed = match fetched {
                Ok(parsed) => parsed,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(
                        "{} page {} failed, keeping {} records from earlier pages: {}",
                        self.name,
                        page,
                        records.len(),
                        e
                    );
                    break;
                }
            };
            if parsed.is_empty() {
                debug!("{} page {} is empty, stopping", self.name, page);
                break;
            }
            records.extend(parsed);
        }

        Ok(records)
    }
}

/// Parse one API page. A body that is not JSON or lacks a `data` array is a
/// payload-shape error; individual malformed entries are skipped.
pub fn parse_json_page(body: &str, source: &str) -> Result<Vec<ProxyRecord>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| parse_error(source, format!("invalid JSON: {}", e)))?;
    let entries = value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| parse_error(source, "missing `data` array"))?;

    Ok(entries
        .iter()
        .flat_map(|entry| parse_entry(entry, source))
        .collect())
}

fn parse_entry(entry: &Value, source: &str) -> Vec<ProxyRecord> {
    let Some(ip) = entry.get("ip").and_then(Value::as_str) else {
        return Vec::new();
    };
    let port = match entry.get("port") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Vec::new(),
    };

    let protocols: Vec<ProxyProtocol> = match entry.get("protocols").and_then(Value::as_array) {
        Some(list) => list
            .iter()
            .filter_map(Value::as_str)
            .filter_map(ProxyProtocol::from_str)
            .collect(),
        None => vec![ProxyProtocol::Http],
    };

    let country = entry.get("country").and_then(Value::as_str);
    let anonymity = entry
        .get("anonymityLevel")
        .and_then(Value::as_str)
        .map(AnonymityLevel::from_label);
    let speed = entry
        .get("responseTime")
        .or_else(|| entry.get("speed"))
        .and_then(Value::as_u64);

    protocols
        .into_iter()
        .filter_map(|protocol| {
            let mut record = ProxyRecord::parse(ip, &port, protocol, source)?;
            if let Some(country) = country {
                record = record.with_country(country);
            }
            if let Some(anonymity) = anonymity {
                record = record.with_anonymity(anonymity);
            }
            if let Some(speed) = speed {
                record = record.with_speed_ms(speed);
            }
            Some(record)
        })
        .collect()
}
