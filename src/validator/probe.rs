//! Probe capability used by the validator

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use url::Url;

use crate::error::{Result, ScoutError};
use crate::models::ProxyRecord;

/// Identity-echo site requested during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSite {
    pub url: String,
    pub host: String,
    pub port: u16,
    /// Origin-form request target, e.g. `/get?x=1`
    pub path_and_query: String,
}

impl TestSite {
    /// Parse an `http://` URL. Other schemes are rejected because the probe
    /// speaks plain HTTP/1 over the proxied stream.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)?;
        if url.scheme() != "http" {
            return Err(ScoutError::UnsupportedTestSite(raw.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ScoutError::InvalidRequest(format!("test site {} has no host", raw)))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        let mut path_and_query = url.path().to_string();
        if let Some(query) = url.query() {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }

        Ok(Self {
            url: url.to_string(),
            host,
            port,
            path_and_query,
        })
    }

    /// Value for the `Host` header
    pub fn authority(&self) -> String {
        if self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Response captured by a probe
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ProbeResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Performs HTTP requests to test sites, either directly or through a proxy.
/// Timeouts are applied by the caller.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    /// Request `site` without any proxy, used to learn our own identity
    async fn fetch_direct(&self, site: &TestSite) -> Result<ProbeResponse>;

    /// Request `site` through `proxy`
    async fn fetch_via(&self, proxy: &ProxyRecord, site: &TestSite) -> Result<ProbeResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_test_site() {
        let site = TestSite::parse("http://httpbin.org/get?show_env=1").unwrap();
        assert_eq!(site.host, "httpbin.org");
        assert_eq!(site.port, 80);
        assert_eq!(site.path_and_query, "/get?show_env=1");
        assert_eq!(site.authority(), "httpbin.org");

        let site = TestSite::parse("http://127.0.0.1:8081").unwrap();
        assert_eq!(site.path_and_query, "/");
        assert_eq!(site.authority(), "127.0.0.1:8081");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let err = TestSite::parse("https://httpbin.org/get").unwrap_err();
        assert!(matches!(err, ScoutError::UnsupportedTestSite(_)));

        let err = TestSite::parse("not a url").unwrap_err();
        assert!(matches!(err, ScoutError::InvalidRequest(_)));
    }
}
