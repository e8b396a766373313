//! API server using Axum
//!
//! Serves the harvest/validate endpoints, hub diagnostics and the observer
//! WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{Result, ScoutError};
use crate::harvest::{HarvestCoordinator, SourceRegistry};
use crate::hub::EventHub;
use crate::validator::{ProxyProbe, ProxyValidator};

use super::middleware::cors_layer;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: EventHub,
    pub sources: SourceRegistry,
    pub harvester: HarvestCoordinator,
    pub validator: ProxyValidator,
    pub started_at: Instant,
    /// Cancelled at shutdown; harvest and validation runs use child tokens
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        hub: EventHub,
        sources: SourceRegistry,
        probe: Arc<dyn ProxyProbe>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            harvester: HarvestCoordinator::new(hub.clone()),
            validator: ProxyValidator::new(probe, hub.clone()),
            hub,
            sources,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }
}

/// API server
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        let cors = cors_layer(&self.state.config.api.cors_origins);

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = self.state.config.api_addr().parse().map_err(|_| {
            ScoutError::InvalidConfig(format!(
                "invalid API address {}",
                self.state.config.api_addr()
            ))
        })?;

        let listener = TcpListener::bind(addr).await?;
        info!("API server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Serve on an already bound listener until `shutdown` flips
    #[instrument(skip_all)]
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let router = self.build_router();
        let runs = self.state.shutdown.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
                // Abort in-flight harvest and validation runs
                runs.cancel();
            })
            .await
            .map_err(|e| ScoutError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
