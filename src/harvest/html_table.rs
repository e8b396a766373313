//! HTML table sources (free-proxy-list layout)

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use super::source::{parse_error, SourceAdapter, SourceClient};
use crate::error::Result;
use crate::models::{AnonymityLevel, ProxyProtocol, ProxyRecord};

static ROW_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("Invalid row regex"));

static CELL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("Invalid cell regex"));

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("Invalid tag regex"));

/// Source rendering proxies as an HTML table
pub struct HtmlTableSource {
    name: String,
    url: String,
    client: SourceClient,
}

impl HtmlTableSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: SourceClient) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl SourceAdapter for HtmlTableSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn harvest(&self, _page_limit: u32) -> Result<Vec<ProxyRecord>> {
        let body = self.client.fetch_text(&self.name, &self.url).await?;
        parse_html_table(&body, &self.name)
    }
}

/// Parse table rows shaped like `ip | port | code | country | [version |]
/// anonymity | google | https | last checked`. A page without any table rows
/// is a payload-shape error.
pub fn parse_html_table(html: &str, source: &str) -> Result<Vec<ProxyRecord>> {
    let mut saw_row = false;
    let mut records = Vec::new();

    for row in ROW_REGEX.captures_iter(html) {
        saw_row = true;
        let cells: Vec<String> = CELL_REGEX
            .captures_iter(&row[1])
            .map(|cell| TAG_REGEX.replace_all(&cell[1], "").trim().to_string())
            .collect();
        if let Some(record) = parse_row(&cells, source) {
            records.push(record);
        }
    }

    if !saw_row {
        return Err(parse_error(source, "no table rows found"));
    }
    Ok(records)
}

fn parse_row(cells: &[String], source: &str) -> Option<ProxyRecord> {
    if cells.len() < 2 {
        return None;
    }

    // socks-proxy.net puts a protocol version column where others have anonymity
    let socks_version = cells
        .get(4)
        .and_then(|c| ProxyProtocol::from_str(c))
        .filter(ProxyProtocol::is_socks);
    let https = cells
        .get(if socks_version.is_some() { 7 } else { 6 })
        .map(|c| c.eq_ignore_ascii_case("yes"))
        .unwrap_or(false);
    let protocol = match socks_version {
        Some(version) => version,
        None if https => ProxyProtocol::Https,
        None => ProxyProtocol::Http,
    };

    let mut record = ProxyRecord::parse(&cells[0], &cells[1], protocol, source)?;
    if let Some(code) = cells.get(2).filter(|c| c.len() == 2) {
        record = record.with_country(code.to_uppercase());
    }
    let anonymity_cell = if socks_version.is_some() { 5 } else { 4 };
    if let Some(label) = cells.get(anonymity_cell) {
        let level = AnonymityLevel::from_label(label);
        if level != AnonymityLevel::Unknown {
            record = record.with_anonymity(level);
        }
    }
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoutError;

    const FREE_PROXY_LIST: &str = r#"
<table class="table">
<thead><tr><th>IP Address</th><th>Port</th><th>Code</th></tr></thead>
<tbody>
<tr><td>1.2.3.4</td><td>8080</td><td>US</td><td class='hm'>United States</td><td>elite proxy</td><td class='hm'>no</td><td class='hx'>yes</td><td class='hm'>1 min ago</td></tr>
<tr><td>5.6.7.8</td><td>3128</td><td>de</td><td class='hm'>Germany</td><td>transparent</td><td class='hm'>no</td><td class='hx'>no</td><td class='hm'>2 mins ago</td></tr>
<tr><td>999.6.7.8</td><td>3128</td><td>DE</td><td>Germany</td><td>anonymous</td><td>no</td><td>no</td><td>1 min ago</td></tr>
</tbody>
</table>"#;

    #[test]
    fn test_parse_free_proxy_list_rows() {
        let records = parse_html_table(FREE_PROXY_LIST, "free-proxy-list").unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].address(), "1.2.3.4:8080");
        assert_eq!(records[0].protocol, ProxyProtocol::Https);
        assert_eq!(records[0].country.as_deref(), Some("US"));
        assert_eq!(records[0].anonymity, Some(AnonymityLevel::Elite));

        assert_eq!(records[1].protocol, ProxyProtocol::Http);
        assert_eq!(records[1].country.as_deref(), Some("DE"));
        assert_eq!(records[1].anonymity, Some(AnonymityLevel::Transparent));
    }

    #[test]
    fn test_parse_socks_layout() {
        let html = "<tr><td>9.9.9.9</td><td>1080</td><td>FR</td><td>France</td><td>Socks5</td><td>Anonymous</td><td>Yes</td><td>1 min ago</td></tr>";
        let records = parse_html_table(html, "socks-proxy").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].protocol, ProxyProtocol::Socks5);
        assert_eq!(records[0].anonymity, Some(AnonymityLevel::Anonymous));
    }

    #[test]
    fn test_page_without_rows_is_shape_error() {
        let err = parse_html_table("<html><body>blocked</body></html>", "fpl").unwrap_err();
        assert!(matches!(err, ScoutError::SourceParse { .. }));
    }
}
