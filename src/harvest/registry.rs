//! Named set of proxy-list sources

use std::sync::Arc;

use super::geonode::JsonApiSource;
use super::html_table::HtmlTableSource;
use super::plain_list::PlainListSource;
use super::source::{SourceAdapter, SourceClient};
use crate::error::{Result, ScoutError};
use crate::models::ProxyProtocol;

const PROXYSCRAPE_URL: &str =
    "https://api.proxyscrape.com/v2/?request=getproxies&timeout=10000&country=all&ssl=all&anonymity=all&protocol=";

/// Sources in declaration order. Declaration order is also the order used to
/// break ties when two sources report the same proxy.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in public sources
    pub fn with_defaults(client: SourceClient) -> Self {
        let mut registry = Self::new();
        for protocol in [ProxyProtocol::Http, ProxyProtocol::Socks4, ProxyProtocol::Socks5] {
            registry.add(PlainListSource::new(
                format!("proxyscrape-{}", protocol),
                format!("{}{}", PROXYSCRAPE_URL, protocol),
                protocol,
                client.clone(),
            ));
        }
        registry.add(JsonApiSource::geonode(client.clone()));
        registry.add(HtmlTableSource::new(
            "free-proxy-list",
            "https://free-proxy-list.net/",
            client.clone(),
        ));
        registry.add(HtmlTableSource::new(
            "sslproxies",
            "https://www.sslproxies.org/",
            client.clone(),
        ));
        registry.add(HtmlTableSource::new(
            "socks-proxy",
            "https://www.socks-proxy.net/",
            client,
        ));
        registry
    }

    pub fn add(&mut self, source: impl SourceAdapter + 'static) {
        self.sources.push(Arc::new(source));
    }

    pub fn add_arc(&mut self, source: Arc<dyn SourceAdapter>) {
        self.sources.push(source);
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Pick sources by name, keeping declaration order. `None` or an empty
    /// list selects everything.
    pub fn select(&self, names: Option<&[String]>) -> Result<Vec<Arc<dyn SourceAdapter>>> {
        let names = match names {
            Some(names) if !names.is_empty() => names,
            _ => return Ok(self.sources.clone()),
        };

        if let Some(unknown) = names
            .iter()
            .find(|name| !self.sources.iter().any(|s| s.name() == name.as_str()))
        {
            return Err(ScoutError::InvalidRequest(format!(
                "unknown source '{}' (available: {})",
                unknown,
                self.names().join(", ")
            )));
        }

        Ok(self
            .sources
            .iter()
            .filter(|s| names.iter().any(|name| name == s.name()))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> SourceRegistry {
        let client = SourceClient::new("proxyscout-test", Duration::from_secs(5)).unwrap();
        SourceRegistry::with_defaults(client)
    }

    #[test]
    fn test_default_sources() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec![
                "proxyscrape-http",
                "proxyscrape-socks4",
                "proxyscrape-socks5",
                "geonode",
                "free-proxy-list",
                "sslproxies",
                "socks-proxy",
            ]
        );
    }

    #[test]
    fn test_select_keeps_declaration_order() {
        let registry = registry();
        let names = vec!["socks-proxy".to_string(), "geonode".to_string()];
        let selected = registry.select(Some(&names)).unwrap();
        let selected: Vec<&str> = selected.iter().map(|s| s.name()).collect();
        assert_eq!(selected, vec!["geonode", "socks-proxy"]);
    }

    #[test]
    fn test_select_all_when_unspecified() {
        let registry = registry();
        assert_eq!(registry.select(None).unwrap().len(), registry.len());
        assert_eq!(registry.select(Some(&[])).unwrap().len(), registry.len());
    }

    #[test]
    fn test_select_unknown_source() {
        let registry = registry();
        let names = vec!["nope".to_string()];
        let err = registry.select(Some(&names)).err().unwrap();
        assert!(matches!(err, ScoutError::InvalidRequest(_)));
    }
}
