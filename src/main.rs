//! Proxyscout - Entry Point
//!
//! Starts the API server and heartbeat service with graceful shutdown support.

use std::sync::Arc;

use serde_json::json;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use proxyscout::api::{ApiServer, AppState};
use proxyscout::harvest::{SourceClient, SourceRegistry};
use proxyscout::models::SystemEventKind;
use proxyscout::services::{HeartbeatHandle, HeartbeatService};
use proxyscout::validator::{ProxyProbe, TunnelProbe};
use proxyscout::{Config, EventHub};

#[tokio::main]
async fn main() -> proxyscout::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let fmt_layer = if config.log.format == "json" {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("proxyscout={},tower_http=debug", config.log.level).into()),
        )
        .with(fmt_layer)
        .init();

    info!("Starting Proxyscout");

    let hub = EventHub::new(config.hub.clone());

    let client = SourceClient::new(&config.harvest.user_agent, config.harvest.source_timeout)?;
    let sources = SourceRegistry::with_defaults(client);
    info!("Registered {} sources: {:?}", sources.len(), sources.names());

    let probe: Arc<dyn ProxyProbe> = Arc::new(TunnelProbe::new(config.harvest.user_agent.clone()));
    let state = AppState::new(config.clone(), hub.clone(), sources, probe);

    // Create shutdown channel
    let (shutdown_tx, _) = watch::channel(false);

    // Start heartbeat service
    let (heartbeat_handle, heartbeat_shutdown) = HeartbeatHandle::new();
    let heartbeat_service = HeartbeatService::new(hub.clone());
    let heartbeat_task = tokio::spawn(async move {
        heartbeat_service.run(heartbeat_shutdown).await;
    });

    // Bind before announcing the server
    let api_server = ApiServer::new(state);
    let listener = match api_server.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!("API server failed to bind: {}", e);
            hub.system(
                SystemEventKind::ServerError,
                Some(json!({ "error": e.to_string() })),
            );
            heartbeat_handle.shutdown();
            let _ = heartbeat_task.await;
            return Err(e);
        }
    };

    hub.system(
        SystemEventKind::ServerStart,
        Some(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "address": config.api_addr(),
        })),
    );
    info!("API server started on {}", config.api_addr());

    let api_shutdown = shutdown_tx.subscribe();
    let api_hub = hub.clone();
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.serve(listener, api_shutdown).await {
            error!("API server error: {}", e);
            api_hub.system(
                SystemEventKind::ServerError,
                Some(json!({ "error": e.to_string() })),
            );
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    heartbeat_handle.shutdown();
    hub.shutdown();

    let _ = tokio::join!(api_task, heartbeat_task);

    info!("Proxyscout stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
