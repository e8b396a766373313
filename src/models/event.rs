use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log level carried by `log` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(LogLevel::Info),
            "warning" | "warn" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "success" => Some(LogLevel::Success),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Component that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Backend,
    Scraping,
    System,
}

/// Lifecycle state reported by `scraping_progress` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Started,
    Progress,
    Completed,
    Error,
}

/// Kind of `system` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEventKind {
    ServerStart,
    ServerError,
    HighLoad,
    ConnectionCount,
}

/// Process memory figures in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub rss: u64,
    pub virtual_memory: u64,
    pub system_total: u64,
    pub system_used: u64,
}

/// Progress payload shared by harvest and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapingProgress {
    /// Percentage in `0..=100`
    pub progress: u8,
    pub proxies_found: usize,
    pub current_source: String,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tested: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working: Option<usize>,
}

impl ScrapingProgress {
    pub fn new(current_source: impl Into<String>, status: ProgressStatus) -> Self {
        Self {
            progress: 0,
            proxies_found: 0,
            current_source: current_source.into(),
            status,
            error: None,
            tested: None,
            working: None,
        }
    }

    /// Set progress from a done/total ratio, clamped to 100
    pub fn ratio(mut self, done: usize, total: usize) -> Self {
        self.progress = percent(done, total);
        self
    }

    pub fn percent(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn found(mut self, proxies_found: usize) -> Self {
        self.proxies_found = proxies_found;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn tested(mut self, tested: usize, working: usize) -> Self {
        self.tested = Some(tested);
        self.working = Some(working);
        self
    }
}

pub(crate) fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Type-specific event body. Serialized inline next to the envelope fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Log {
        #[serde(default)]
        level: LogLevel,
        message: String,
    },
    ScrapingProgress(ScrapingProgress),
    System {
        event: SystemEventKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Heartbeat {
        /// Hub uptime in seconds
        uptime: u64,
        memory_usage: MemoryUsage,
        active_connections: usize,
    },
}

impl EventPayload {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        EventPayload::Log {
            level,
            message: message.into(),
        }
    }

    pub fn system(event: SystemEventKind, data: Option<Value>) -> Self {
        EventPayload::System { event, data }
    }

    /// Wire name of the event type
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::Log { .. } => "log",
            EventPayload::ScrapingProgress(_) => "scraping_progress",
            EventPayload::System { .. } => "system",
            EventPayload::Heartbeat { .. } => "heartbeat",
        }
    }

    /// Source implied by the payload type
    pub fn default_source(&self) -> EventSource {
        match self {
            EventPayload::Log { .. } => EventSource::Backend,
            EventPayload::ScrapingProgress(_) => EventSource::Scraping,
            EventPayload::System { .. } | EventPayload::Heartbeat { .. } => EventSource::System,
        }
    }
}

/// Event as delivered to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self.payload, EventPayload::Heartbeat { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(payload: EventPayload) -> EventEnvelope {
        EventEnvelope {
            id: "evt-1".to_string(),
            timestamp: Utc::now(),
            source: payload.default_source(),
            payload,
        }
    }

    #[test]
    fn test_log_event_wire_format() {
        let json = serde_json::to_value(envelope(EventPayload::log(LogLevel::Success, "done")))
            .unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["source"], "backend");
        assert_eq!(json["level"], "success");
        assert_eq!(json["message"], "done");
        assert_eq!(json["id"], "evt-1");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_progress_event_wire_format() {
        let progress = ScrapingProgress::new("geonode", ProgressStatus::Error)
            .ratio(1, 4)
            .found(12)
            .error("timeout");
        let json = serde_json::to_value(envelope(EventPayload::ScrapingProgress(progress))).unwrap();
        assert_eq!(json["type"], "scraping_progress");
        assert_eq!(json["source"], "scraping");
        assert_eq!(json["progress"], 25);
        assert_eq!(json["proxiesFound"], 12);
        assert_eq!(json["currentSource"], "geonode");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "timeout");
        assert!(json.get("tested").is_none());
    }

    #[test]
    fn test_heartbeat_and_system_wire_format() {
        let heartbeat = EventPayload::Heartbeat {
            uptime: 42,
            memory_usage: MemoryUsage::default(),
            active_connections: 3,
        };
        let json = serde_json::to_value(envelope(heartbeat)).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert_eq!(json["uptime"], 42);
        assert_eq!(json["activeConnections"], 3);
        assert!(json["memoryUsage"].is_object());

        let system = EventPayload::system(SystemEventKind::HighLoad, Some(json!({"connections": 101})));
        let json = serde_json::to_value(envelope(system)).unwrap();
        assert_eq!(json["type"], "system");
        assert_eq!(json["event"], "high_load");
        assert_eq!(json["data"]["connections"], 101);
    }

    #[test]
    fn test_envelope_deserializes_back() {
        let original = envelope(EventPayload::log(LogLevel::Info, "hello"));
        let text = serde_json::to_string(&original).unwrap();
        let parsed: EventEnvelope = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.payload, original.payload);
        assert_eq!(parsed.source, EventSource::Backend);
    }

    #[test]
    fn test_log_level_defaults_to_info() {
        let payload: EventPayload =
            serde_json::from_value(json!({"type": "log", "message": "hi"})).unwrap();
        assert_eq!(payload, EventPayload::log(LogLevel::Info, "hi"));
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(3, 4), 75);
        assert_eq!(percent(9, 4), 100);
        assert_eq!(ScrapingProgress::new("x", ProgressStatus::Progress).percent(250).progress, 100);
    }
}
