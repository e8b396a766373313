//! Heartbeat service
//!
//! Drives `EventHub::heartbeat_tick` on a fixed interval until shut down.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::hub::EventHub;

/// Periodic heartbeat and stale-observer eviction
pub struct HeartbeatService {
    hub: EventHub,
    period: Duration,
}

impl HeartbeatService {
    pub fn new(hub: EventHub) -> Self {
        let period = hub.config().heartbeat_interval;
        Self { hub, period }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Run until `shutdown` flips to true (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting heartbeat service with {}s interval",
            self.period.as_secs()
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.hub.heartbeat_tick();
                    debug!(
                        "Heartbeat {} sent to {} observers, {} evicted",
                        report.heartbeat.id,
                        report.active_before,
                        report.evicted.len()
                    );
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Heartbeat service shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Guard for stopping the heartbeat service
pub struct HeartbeatHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl HeartbeatHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
