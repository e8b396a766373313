use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Proxy protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
            ProxyProtocol::Socks4 => "socks4",
            ProxyProtocol::Socks5 => "socks5",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" => Some(ProxyProtocol::Http),
            "https" => Some(ProxyProtocol::Https),
            "socks4" | "socks4a" => Some(ProxyProtocol::Socks4),
            "socks5" | "socks5h" => Some(ProxyProtocol::Socks5),
            _ => None,
        }
    }

    pub fn is_socks(&self) -> bool {
        matches!(self, ProxyProtocol::Socks4 | ProxyProtocol::Socks5)
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Anonymity level of a proxy, as reported by a source or observed by validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnonymityLevel {
    Transparent,
    Anonymous,
    Elite,
    #[default]
    Unknown,
}

impl AnonymityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnonymityLevel::Transparent => "transparent",
            AnonymityLevel::Anonymous => "anonymous",
            AnonymityLevel::Elite => "elite",
            AnonymityLevel::Unknown => "unknown",
        }
    }

    /// Lenient parse used for source-reported labels ("elite proxy", "high anonymous", ...)
    pub fn from_label(s: &str) -> Self {
        let s = s.trim().to_lowercase();
        if s.contains("elite") || s.contains("high") {
            AnonymityLevel::Elite
        } else if s.contains("anonymous") || s == "anm" {
            AnonymityLevel::Anonymous
        } else if s.contains("transparent") || s == "noa" {
            AnonymityLevel::Transparent
        } else {
            AnonymityLevel::Unknown
        }
    }

    /// Ranking used when several sites disagree; transparency is handled separately.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            AnonymityLevel::Unknown => 0,
            AnonymityLevel::Transparent => 1,
            AnonymityLevel::Anonymous => 2,
            AnonymityLevel::Elite => 3,
        }
    }
}

impl std::fmt::Display for AnonymityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a proxy within one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProxyKey {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub protocol: ProxyProtocol,
}

impl std::fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.ip, self.port)
    }
}

/// Harvested proxy record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRecord {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub protocol: ProxyProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymity: Option<AnonymityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_ms: Option<u64>,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_working: Option<bool>,
}

impl ProxyRecord {
    pub fn new(ip: Ipv4Addr, port: u16, protocol: ProxyProtocol, source: impl Into<String>) -> Self {
        Self {
            ip,
            port,
            protocol,
            country: None,
            anonymity: None,
            speed_ms: None,
            source: source.into(),
            last_checked: None,
            is_working: None,
        }
    }

    /// Build a record from raw text fields, returning `None` when the address
    /// is not a dotted-quad IPv4 or the port falls outside `1..=65535`.
    pub fn parse(
        ip: &str,
        port: &str,
        protocol: ProxyProtocol,
        source: impl Into<String>,
    ) -> Option<Self> {
        let ip = parse_ipv4(ip)?;
        let port = parse_port(port)?;
        Some(Self::new(ip, port, protocol, source))
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        let country = country.into();
        if !country.trim().is_empty() {
            self.country = Some(country.trim().to_string());
        }
        self
    }

    pub fn with_anonymity(mut self, anonymity: AnonymityLevel) -> Self {
        self.anonymity = Some(anonymity);
        self
    }

    pub fn with_speed_ms(mut self, speed_ms: u64) -> Self {
        self.speed_ms = Some(speed_ms);
        self
    }

    pub fn key(&self) -> ProxyKey {
        ProxyKey {
            ip: self.ip,
            port: self.port,
            protocol: self.protocol,
        }
    }

    /// Address in `ip:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Strict dotted-quad IPv4 parse: exactly four decimal octets in `0..=255`.
pub fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    let s = s.trim();
    let mut octets = [0u8; 4];
    let mut parts = s.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *octet = part.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// Port parse rejecting zero and anything above 65535.
pub fn parse_port(s: &str) -> Option<u16> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match s.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}
