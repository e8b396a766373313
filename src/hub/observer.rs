//! Observer registry entries

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::models::EventEnvelope;

/// Sending half of an observer's bounded event queue
pub type ObserverSink = mpsc::Sender<Arc<EventEnvelope>>;

/// Receiving half handed to the connection task
pub type ObserverStream = mpsc::Receiver<Arc<EventEnvelope>>;

/// Observer transition reported in `connection_count` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverState {
    Connected,
    Disconnected,
    Evicted,
}

/// Diagnostic view of a registered observer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverInfo {
    pub id: String,
    pub connected_at: DateTime<Utc>,
    pub last_ping: DateTime<Utc>,
}

pub(crate) struct ObserverEntry {
    pub sink: ObserverSink,
    pub connected_at: DateTime<Utc>,
    pub last_ping_at: DateTime<Utc>,
    /// Monotonic clock reading used for eviction
    pub last_ping: Instant,
}

impl ObserverEntry {
    pub fn new(sink: ObserverSink) -> Self {
        let now = Utc::now();
        Self {
            sink,
            connected_at: now,
            last_ping_at: now,
            last_ping: Instant::now(),
        }
    }

    /// Record an acknowledgement. Neither clock reading moves backward.
    pub fn touch(&mut self) {
        self.last_ping = self.last_ping.max(Instant::now());
        self.last_ping_at = self.last_ping_at.max(Utc::now());
    }

    pub fn is_stale(&self, now: Instant, client_timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_ping) > client_timeout
    }

    pub fn info(&self, id: &str) -> ObserverInfo {
        ObserverInfo {
            id: id.to_string(),
            connected_at: self.connected_at,
            last_ping: self.last_ping_at,
        }
    }
}
