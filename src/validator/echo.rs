//! Identity echo parsing and anonymity classification

use std::collections::HashMap;
use std::net::IpAddr;

use serde_json::Value;

use crate::models::AnonymityLevel;

/// Request headers that reveal a proxy sits in the path
pub const PROXY_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-real-ip",
    "x-proxy-id",
    "x-originating-ip",
    "forwarded",
    "forwarded-for",
    "via",
    "proxy-connection",
    "client-ip",
    "x-client-ip",
    "x-cluster-client-ip",
];

/// Headers that may carry the original client address
const FORWARDING_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "forwarded",
    "forwarded-for",
    "client-ip",
    "x-client-ip",
    "x-originating-ip",
    "x-cluster-client-ip",
];

/// What an echo site saw of the requester
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EchoIdentity {
    /// Addresses reported as the request origin
    pub origins: Vec<IpAddr>,
    /// Request headers as seen by the site, names lowercased
    pub headers: HashMap<String, String>,
}

impl EchoIdentity {
    pub fn primary_origin(&self) -> Option<IpAddr> {
        self.origins.first().copied()
    }

    pub fn has_proxy_headers(&self) -> bool {
        PROXY_HEADERS.iter().any(|h| self.headers.contains_key(*h))
    }

    /// Whether `ip` shows up as an origin or inside a forwarding header
    pub fn reveals(&self, ip: IpAddr) -> bool {
        if self.origins.contains(&ip) {
            return true;
        }
        FORWARDING_HEADERS
            .iter()
            .filter_map(|h| self.headers.get(*h))
            .any(|value| extract_ips(value).contains(&ip))
    }
}

/// Parse an echo body: a JSON object with `origin`/`ip` and optional
/// `headers`, or a bare IP address in plain text. Returns `None` when no
/// identity can be extracted.
pub fn parse_echo(body: &[u8]) -> Option<EchoIdentity> {
    let text = std::str::from_utf8(body).ok()?.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        let mut identity = EchoIdentity::default();
        for field in ["origin", "ip"] {
            if let Some(value) = map.get(field).and_then(Value::as_str) {
                for ip in extract_ips(value) {
                    if !identity.origins.contains(&ip) {
                        identity.origins.push(ip);
                    }
                }
            }
        }
        if let Some(Value::Object(headers)) = map.get("headers") {
            identity.headers = headers
                .iter()
                .filter_map(|(name, value)| {
                    value.as_str().map(|v| (name.to_ascii_lowercase(), v.to_string()))
                })
                .collect();
        }

        if identity.origins.is_empty() && identity.headers.is_empty() {
            return None;
        }
        return Some(identity);
    }

    let ip: IpAddr = text.parse().ok()?;
    Some(EchoIdentity {
        origins: vec![ip],
        headers: HashMap::new(),
    })
}

/// Pull every IP out of a comma/semicolon separated header value. Handles
/// `for=1.2.3.4` pairs from `Forwarded` and `ip:port` suffixes.
fn extract_ips(value: &str) -> Vec<IpAddr> {
    value
        .split([',', ';'])
        .filter_map(|part| {
            let part = part.trim();
            let part = part
                .strip_prefix("for=")
                .or_else(|| part.strip_prefix("For="))
                .unwrap_or(part)
                .trim_matches('"');
            part.parse::<IpAddr>().ok().or_else(|| {
                let (host, _port) = part.rsplit_once(':')?;
                host.parse().ok()
            })
        })
        .collect()
}

/// Classify one echo observation against our own direct address.
///
/// Without `real_ip` a leak cannot be ruled out, so the best verdict is
/// `Anonymous` (proxy headers seen) or `Unknown`.
pub fn classify(identity: Option<&EchoIdentity>, real_ip: Option<IpAddr>) -> AnonymityLevel {
    let Some(identity) = identity else {
        return AnonymityLevel::Unknown;
    };

    if real_ip.is_some_and(|ip| identity.reveals(ip)) {
        return AnonymityLevel::Transparent;
    }
    if identity.has_proxy_headers() {
        return AnonymityLevel::Anonymous;
    }
    if real_ip.is_some() && identity.primary_origin().is_some() {
        return AnonymityLevel::Elite;
    }
    AnonymityLevel::Unknown
}

/// Fold per-site levels: any transparent sighting wins, otherwise the
/// strongest level observed.
pub fn combine(levels: impl IntoIterator<Item = AnonymityLevel>) -> AnonymityLevel {
    let mut best = AnonymityLevel::Unknown;
    for level in levels {
        if level == AnonymityLevel::Transparent {
            return AnonymityLevel::Transparent;
        }
        if level.rank() > best.rank() {
            best = level;
        }
    }
    best
}
