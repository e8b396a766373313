//! Event broadcast hub
//!
//! Owns the observer registry and fans typed events out to every connected
//! observer. Each observer gets a bounded queue; a full or closed queue gets
//! the observer evicted instead of stalling emission to everyone else.
//! All registry mutation happens under a single mutex, which also stamps
//! event ids and timestamps so per-observer delivery order matches
//! timestamp order.

mod observer;

pub use observer::{ObserverInfo, ObserverSink, ObserverState, ObserverStream};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use sysinfo::System;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{Result, ScoutError};
use crate::models::{
    EventEnvelope, EventPayload, EventSource, LogLevel, MemoryUsage, ScrapingProgress,
    SystemEventKind,
};

use observer::ObserverEntry;

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_event_id() -> String {
    format!(
        "evt-{}-{}",
        Utc::now().timestamp_millis(),
        EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

struct Registry {
    observers: HashMap<String, ObserverEntry>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Registry {
    fn stamp(&mut self, source: EventSource, payload: EventPayload) -> Arc<EventEnvelope> {
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);

        Arc::new(EventEnvelope {
            id: next_event_id(),
            timestamp,
            source,
            payload,
        })
    }
}

struct HubInner {
    config: HubConfig,
    registry: Mutex<Registry>,
    started_at: Instant,
    system: Mutex<System>,
}

/// Result of one heartbeat tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub heartbeat: Arc<EventEnvelope>,
    pub active_before: usize,
    pub evicted: Vec<String>,
}

/// Event broadcast hub. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// Create a hub with an empty registry
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                registry: Mutex::new(Registry {
                    observers: HashMap::new(),
                    last_timestamp: None,
                }),
                started_at: Instant::now(),
                system: Mutex::new(System::new()),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Register an observer under a caller-chosen id. The welcome event goes
    /// to this observer only.
    pub fn register(&self, id: impl Into<String>, sink: ObserverSink) -> Result<ObserverInfo> {
        let id = id.into();

        let (info, count) = {
            let mut registry = self.inner.registry.lock();
            if registry.observers.contains_key(&id) {
                return Err(ScoutError::DuplicateObserver { id });
            }

            let entry = ObserverEntry::new(sink);
            let welcome = registry.stamp(
                EventSource::Backend,
                EventPayload::log(
                    LogLevel::Info,
                    format!("Connected to proxyscout event stream as {}", id),
                ),
            );
            if entry.sink.try_send(welcome).is_err() {
                return Err(ScoutError::Internal(format!(
                    "observer {} sink rejected the welcome event",
                    id
                )));
            }

            let info = entry.info(&id);
            registry.observers.insert(id.clone(), entry);
            (info, registry.observers.len())
        };

        info!("Observer {} connected ({} active)", id, count);
        self.emit_connection_count(count, &id, ObserverState::Connected);
        Ok(info)
    }

    /// Assign a fresh id, create a bounded queue and register it
    pub fn connect(&self) -> Result<(ObserverInfo, ObserverStream)> {
        let (tx, rx) = mpsc::channel(self.inner.config.observer_buffer.max(1));
        let id = uuid::Uuid::new_v4().to_string();
        let info = self.register(id, tx)?;
        Ok((info, rx))
    }

    /// Remove an observer. Returns whether it was present.
    pub fn unregister(&self, id: &str) -> bool {
        let (removed, count) = {
            let mut registry = self.inner.registry.lock();
            let removed = registry.observers.remove(id).is_some();
            (removed, registry.observers.len())
        };

        if removed {
            info!("Observer {} disconnected ({} active)", id, count);
            self.emit_connection_count(count, id, ObserverState::Disconnected);
        }
        removed
    }

    /// Record a heartbeat acknowledgement. Returns false for unknown ids.
    pub fn touch(&self, id: &str) -> bool {
        let mut registry = self.inner.registry.lock();
        match registry.observers.get_mut(id) {
            Some(entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Emit an event with the source implied by its type
    pub fn emit(&self, payload: EventPayload) -> Arc<EventEnvelope> {
        let source = payload.default_source();
        self.emit_from(source, payload)
    }

    /// Stamp and fan out an event. Observers whose queue is full or closed are
    /// removed; delivery to the rest is unaffected.
    pub fn emit_from(&self, source: EventSource, payload: EventPayload) -> Arc<EventEnvelope> {
        let (event, delivered, dropped) = {
            let mut registry = self.inner.registry.lock();
            let event = registry.stamp(source, payload);

            let mut delivered = 0;
            let mut dropped = Vec::new();
            for (id, entry) in registry.observers.iter() {
                match entry.sink.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => dropped.push((id.clone(), "queue full")),
                    Err(TrySendError::Closed(_)) => dropped.push((id.clone(), "sink closed")),
                }
            }
            for (id, _) in &dropped {
                registry.observers.remove(id);
            }
            (event, delivered, dropped)
        };

        for (id, reason) in &dropped {
            warn!("Evicted observer {}: {}", id, reason);
        }
        debug!(
            "Emitted {} event {} to {} observers",
            event.payload.type_name(),
            event.id,
            delivered
        );
        event
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> Arc<EventEnvelope> {
        self.emit(EventPayload::log(level, message))
    }

    pub fn progress(&self, progress: ScrapingProgress) -> Arc<EventEnvelope> {
        self.emit(EventPayload::ScrapingProgress(progress))
    }

    pub fn system(
        &self,
        event: SystemEventKind,
        data: Option<serde_json::Value>,
    ) -> Arc<EventEnvelope> {
        self.emit(EventPayload::system(event, data))
    }

    /// Broadcast a heartbeat, then evict observers idle longer than the
    /// client timeout.
    pub fn heartbeat_tick(&self) -> TickReport {
        let active_before = self.observer_count();
        let heartbeat = self.emit(EventPayload::Heartbeat {
            uptime: self.uptime_secs(),
            memory_usage: self.memory_usage(),
            active_connections: active_before,
        });

        let threshold = self.inner.config.high_load_threshold;
        if threshold > 0 && active_before > threshold {
            warn!(
                "High load: {} observers connected (threshold {})",
                active_before, threshold
            );
            self.system(
                SystemEventKind::HighLoad,
                Some(json!({ "activeConnections": active_before, "threshold": threshold })),
            );
        }

        let evicted = self.evict_stale(Instant::now());
        if !evicted.is_empty() {
            let count = self.observer_count();
            info!(
                "Evicted {} stale observers ({} active)",
                evicted.len(),
                count
            );
            self.system(
                SystemEventKind::ConnectionCount,
                Some(json!({
                    "count": count,
                    "state": ObserverState::Evicted,
                    "observers": evicted,
                })),
            );
        }

        TickReport {
            heartbeat,
            active_before,
            evicted,
        }
    }

    fn evict_stale(&self, now: Instant) -> Vec<String> {
        let client_timeout = self.inner.config.client_timeout;
        let mut registry = self.inner.registry.lock();

        let stale: Vec<String> = registry
            .observers
            .iter()
            .filter(|(_, entry)| entry.is_stale(now, client_timeout))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            registry.observers.remove(id);
            debug!("Observer {} timed out", id);
        }
        stale
    }

    /// Snapshot of registered observers, oldest first
    pub fn list_observers(&self) -> Vec<ObserverInfo> {
        let registry = self.inner.registry.lock();
        let mut observers: Vec<ObserverInfo> = registry
            .observers
            .iter()
            .map(|(id, entry)| entry.info(id))
            .collect();
        drop(registry);

        observers.sort_by(|a, b| a.connected_at.cmp(&b.connected_at).then(a.id.cmp(&b.id)));
        observers
    }

    pub fn observer_count(&self) -> usize {
        self.inner.registry.lock().observers.len()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.inner.registry.lock().observers.contains_key(id)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// Drop every observer, closing their queues. Used at process shutdown.
    pub fn shutdown(&self) -> usize {
        let mut registry = self.inner.registry.lock();
        let count = registry.observers.len();
        registry.observers.clear();
        drop(registry);

        if count > 0 {
            info!("Event hub closed {} observer connections", count);
        }
        count
    }

    fn emit_connection_count(&self, count: usize, id: &str, state: ObserverState) {
        self.system(
            SystemEventKind::ConnectionCount,
            Some(json!({ "count": count, "observerId": id, "state": state })),
        );
    }

    fn memory_usage(&self) -> MemoryUsage {
        let mut sys = self.inner.system.lock();
        sys.refresh_memory();

        let (rss, virtual_memory) = match sysinfo::get_current_pid() {
            Ok(pid) => {
                sys.refresh_process(pid);
                sys.process(pid)
                    .map(|p| (p.memory(), p.virtual_memory()))
                    .unwrap_or((0, 0))
            }
            Err(_) => (0, 0),
        };

        MemoryUsage {
            rss,
            virtual_memory,
            system_total: sys.total_memory(),
            system_used: sys.used_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hub() -> EventHub {
        EventHub::new(HubConfig {
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(60),
            observer_buffer: 16,
            high_load_threshold: 100,
        })
    }

    fn drain(rx: &mut ObserverStream) -> Vec<Arc<EventEnvelope>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_register_sends_welcome_to_new_observer_only() {
        let hub = hub();
        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, mut rx2) = mpsc::channel(16);

        hub.register("c1", tx1).unwrap();
        drain(&mut rx1);
        hub.register("c2", tx2).unwrap();

        let first = drain(&mut rx2);
        assert!(matches!(
            first[0].payload,
            EventPayload::Log { level: LogLevel::Info, .. }
        ));

        // c1 sees the connection_count event for c2 but no welcome log
        let seen_by_c1 = drain(&mut rx1);
        assert!(seen_by_c1
            .iter()
            .all(|e| !matches!(e.payload, EventPayload::Log { .. })));
        assert!(seen_by_c1.iter().any(|e| matches!(
            e.payload,
            EventPayload::System {
                event: SystemEventKind::ConnectionCount,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_duplicate_register_is_rejected() {
        let hub = hub();
        let (tx1, _rx1) = mpsc::channel(16);
        let (tx2, _rx2) = mpsc::channel(16);

        hub.register("c1", tx1).unwrap();
        let err = hub.register("c1", tx2).unwrap_err();
        assert!(matches!(err, ScoutError::DuplicateObserver { ref id } if id == "c1"));
        assert_eq!(hub.observer_count(), 1);
    }

    #[tokio::test]
    async fn test_emit_reaches_all_observers_and_isolates_failures() {
        let hub = hub();
        let (tx_ok, mut rx_ok) = mpsc::channel(16);
        let (tx_closed, rx_closed) = mpsc::channel(16);
        let (tx_full, _rx_full) = mpsc::channel(1);

        hub.register("ok", tx_ok).unwrap();
        hub.register("closed", tx_closed).unwrap();
        // The welcome event fills this one-slot queue.
        hub.register("full", tx_full).unwrap();
        drop(rx_closed);
        drain(&mut rx_ok);

        hub.log(LogLevel::Success, "harvest finished");

        let received = drain(&mut rx_ok);
        assert_eq!(received.len(), 1);
        assert!(matches!(
            &received[0].payload,
            EventPayload::Log { message, .. } if message == "harvest finished"
        ));
        assert!(hub.is_registered("ok"));
        assert!(!hub.is_registered("closed"));
        assert!(!hub.is_registered("full"));
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent_and_closes_sink() {
        let hub = hub();
        let (tx, mut rx) = mpsc::channel(16);
        hub.register("c1", tx).unwrap();

        assert!(hub.unregister("c1"));
        assert!(!hub.unregister("c1"));
        assert!(!hub.unregister("never-seen"));

        drain(&mut rx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_ids_unique_and_timestamps_monotonic() {
        let hub = EventHub::new(HubConfig {
            observer_buffer: 128,
            ..HubConfig::default()
        });
        let (info, mut rx) = hub.connect().unwrap();
        assert!(hub.is_registered(&info.id));

        for i in 0..50 {
            hub.log(LogLevel::Info, format!("event {}", i));
        }

        let events = drain(&mut rx);
        assert!(events.len() >= 51);
        let mut ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), events.len());
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_after_timeout_and_not_before() {
        let hub = hub();
        let (tx, mut rx) = mpsc::channel(16);
        hub.register("c1", tx).unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let report = hub.heartbeat_tick();
        assert!(report.evicted.is_empty());
        assert!(hub.is_registered("c1"));

        tokio::time::advance(Duration::from_secs(1)).await;
        let report = hub.heartbeat_tick();
        assert_eq!(report.evicted, vec!["c1".to_string()]);
        assert!(!hub.is_registered("c1"));

        // queue is closed once the buffered events are drained
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| e.is_heartbeat()));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_defers_eviction() {
        let hub = hub();
        let (tx, _rx) = mpsc::channel(64);
        hub.register("c1", tx).unwrap();
        let before = hub.list_observers()[0].last_ping;

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(hub.touch("c1"));
        assert!(!hub.touch("unknown"));
        assert!(hub.list_observers()[0].last_ping >= before);

        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(hub.heartbeat_tick().evicted.is_empty());

        tokio::time::advance(Duration::from_secs(16)).await;
        assert_eq!(hub.heartbeat_tick().evicted, vec!["c1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_emit_then_forced_timeout_leaves_registry_empty() {
        let hub = hub();
        let (tx, mut rx) = mpsc::channel(16);
        hub.register("c1", tx).unwrap();
        hub.log(LogLevel::Info, "hello");

        let received = drain(&mut rx);
        assert!(received.iter().any(|e| matches!(
            &e.payload,
            EventPayload::Log { message, .. } if message == "hello"
        )));

        tokio::time::advance(hub.config().client_timeout + Duration::from_millis(1)).await;
        hub.heartbeat_tick();

        assert_eq!(hub.observer_count(), 0);
        assert!(hub.list_observers().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_reports_active_connections() {
        let hub = hub();
        let (_a, mut rx) = hub.connect().unwrap();
        let (_b, _rx_b) = hub.connect().unwrap();
        drain(&mut rx);

        let report = hub.heartbeat_tick();
        assert_eq!(report.active_before, 2);
        match &report.heartbeat.payload {
            EventPayload::Heartbeat {
                active_connections, ..
            } => assert_eq!(*active_connections, 2),
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(drain(&mut rx).iter().any(|e| e.is_heartbeat()));
    }

    #[tokio::test]
    async fn test_high_load_event_above_threshold() {
        let hub = EventHub::new(HubConfig {
            high_load_threshold: 1,
            ..HubConfig::default()
        });
        let (_a, mut rx) = hub.connect().unwrap();
        let (_b, _rx_b) = hub.connect().unwrap();
        drain(&mut rx);

        hub.heartbeat_tick();
        assert!(drain(&mut rx).iter().any(|e| matches!(
            e.payload,
            EventPayload::System {
                event: SystemEventKind::HighLoad,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_shutdown_clears_registry() {
        let hub = hub();
        let (_info, mut rx) = hub.connect().unwrap();
        assert_eq!(hub.shutdown(), 1);
        assert_eq!(hub.observer_count(), 0);
        drain(&mut rx);
        assert!(rx.recv().await.is_none());
    }
}
