//! Plain-text `ip:port` list sources

use async_trait::async_trait;

use super::source::{parse_error, SourceAdapter, SourceClient};
use crate::error::Result;
use crate::models::{ProxyProtocol, ProxyRecord};

/// Source serving one `ip:port` entry per line
pub struct PlainListSource {
    name: String,
    url: String,
    protocol: ProxyProtocol,
    client: SourceClient,
}

impl PlainListSource {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        protocol: ProxyProtocol,
        client: SourceClient,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            protocol,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SourceAdapter for PlainListSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn harvest(&self, _page_limit: u32) -> Result<Vec<ProxyRecord>> {
        let body = self.client.fetch_text(&self.name, &self.url).await?;
        if body.trim_start().starts_with('<') {
            return Err(parse_error(&self.name, "expected a plain-text list, got markup"));
        }
        Ok(parse_plain_list(&body, self.protocol, &self.name))
    }
}

/// Parse `ip:port` lines. Comments, blanks and malformed rows are skipped.
/// A leading `scheme://` overrides the source protocol for that row.
pub fn parse_plain_list(body: &str, protocol: ProxyProtocol, source: &str) -> Vec<ProxyRecord> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }

            let (protocol, rest) = match line.split_once("://") {
                Some((scheme, rest)) => (ProxyProtocol::from_str(scheme)?, rest),
                None => (protocol, line),
            };

            // "ip:port", optionally followed by whitespace-separated extras
            let address = rest.split_whitespace().next()?;
            let (ip, port) = address.split_once(':')?;
            ProxyRecord::parse(ip, port, protocol, source)
        })
        .collect()
}
