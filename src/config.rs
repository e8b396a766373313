use crate::error::{Result, ScoutError};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Harvest coordinator configuration
    pub harvest: HarvestConfig,
    /// Proxy validator configuration
    pub validation: ValidationConfig,
    /// Event hub configuration
    pub hub: HubConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 8001)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Maximum number of sources fetched at the same time
    pub max_concurrent_sources: usize,
    /// Hard timeout for one source, retries included
    pub source_timeout: Duration,
    /// Pages to request from paginated sources
    pub page_limit: u32,
    /// Retries for transient fetch failures
    pub max_retries: u32,
    /// User agent sent to proxy-list sources
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Maximum number of proxies tested at the same time
    pub max_concurrent_tests: usize,
    /// Timeout for a single request through a proxy
    pub test_timeout: Duration,
    /// Retries for transient test failures
    pub max_retries: u32,
    /// Identity-echo sites requested through each proxy
    pub test_sites: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Interval between heartbeat ticks
    pub heartbeat_interval: Duration,
    /// Observers silent for longer than this are evicted
    pub client_timeout: Duration,
    /// Bounded queue length per observer
    pub observer_buffer: usize,
    /// Active observer count above which a high_load event is emitted
    pub high_load_threshold: usize,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

pub const DEFAULT_TEST_SITES: &[&str] = &["http://httpbin.org/get", "http://api.ipify.org/"];

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            port: 8001,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 3,
            source_timeout: Duration::from_secs(30),
            page_limit: 3,
            max_retries: 2,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tests: 20,
            test_timeout: Duration::from_secs(10),
            max_retries: 1,
            test_sites: DEFAULT_TEST_SITES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(60),
            observer_buffer: 256,
            high_load_threshold: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let harvest = HarvestConfig {
            max_concurrent_sources: parse_env("HARVEST_MAX_CONCURRENT_SOURCES", "3")?,
            source_timeout: Duration::from_secs(parse_env("HARVEST_SOURCE_TIMEOUT", "30")?),
            page_limit: parse_env("HARVEST_PAGE_LIMIT", "3")?,
            max_retries: parse_env("HARVEST_MAX_RETRIES", "2")?,
            user_agent: get_env_or("HARVEST_USER_AGENT", DEFAULT_USER_AGENT),
        };
        if harvest.max_concurrent_sources == 0 {
            return Err(ScoutError::InvalidConfig(
                "HARVEST_MAX_CONCURRENT_SOURCES must be at least 1".into(),
            ));
        }

        let validation = ValidationConfig {
            max_concurrent_tests: parse_env("VALIDATION_MAX_CONCURRENT", "20")?,
            test_timeout: Duration::from_secs(parse_env("VALIDATION_TIMEOUT", "10")?),
            max_retries: parse_env("VALIDATION_MAX_RETRIES", "1")?,
            test_sites: parse_test_sites(&get_env_or(
                "VALIDATION_TEST_SITES",
                &DEFAULT_TEST_SITES.join(","),
            ))?,
        };
        if validation.max_concurrent_tests == 0 {
            return Err(ScoutError::InvalidConfig(
                "VALIDATION_MAX_CONCURRENT must be at least 1".into(),
            ));
        }

        let hub = HubConfig {
            heartbeat_interval: Duration::from_secs(parse_env("HUB_HEARTBEAT_INTERVAL", "30")?),
            client_timeout: Duration::from_secs(parse_env("HUB_CLIENT_TIMEOUT", "60")?),
            observer_buffer: parse_env("HUB_OBSERVER_BUFFER", "256")?,
            high_load_threshold: parse_env("HUB_HIGH_LOAD_THRESHOLD", "100")?,
        };
        if hub.heartbeat_interval.is_zero() || hub.observer_buffer == 0 {
            return Err(ScoutError::InvalidConfig(
                "HUB_HEARTBEAT_INTERVAL and HUB_OBSERVER_BUFFER must be positive".into(),
            ));
        }

        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "8001").parse().map_err(|_| {
                    ScoutError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            harvest,
            validation,
            hub,
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Parse a comma-separated list of test site URLs. Only plain `http` sites are
/// accepted because probes speak HTTP/1 directly over the proxied stream.
pub fn parse_test_sites(raw: &str) -> Result<Vec<String>> {
    let sites: Vec<String> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            let url = Url::parse(s).map_err(|e| {
                ScoutError::InvalidConfig(format!("test site {} is not a valid URL: {}", s, e))
            })?;
            if url.scheme() != "http" || url.host_str().is_none() {
                return Err(ScoutError::InvalidConfig(format!(
                    "test site {} must be an http:// URL with a host",
                    s
                )));
            }
            Ok(s.to_string())
        })
        .collect::<Result<_>>()?;

    if sites.is_empty() {
        return Err(ScoutError::InvalidConfig(
            "at least one validation test site is required".into(),
        ));
    }
    Ok(sites)
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| ScoutError::InvalidConfig(format!("{} must be a valid number", key)))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
