//! Signaling server listener
//!
//! Binds the TCP listener and serves the router until shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::peer::MediaEngine;
use crate::server::config::ServerConfig;
use crate::server::routes::{self, AppState};
use crate::signal::SignalHub;
use crate::stats::RelayStats;

/// Broadcast relay server
pub struct RelayServer<E: MediaEngine> {
    config: ServerConfig,
    orchestrator: Arc<Orchestrator<E>>,
    next_connection_id: Arc<AtomicU64>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<E: MediaEngine> RelayServer<E> {
    /// Create a new server with the given configuration and media engine
    pub fn new(config: ServerConfig, engine: E) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let orchestrator = Arc::new(Orchestrator::new(
            engine,
            Arc::new(SignalHub::new()),
            Arc::new(RelayStats::new()),
            &config,
        ));

        Self {
            config,
            orchestrator,
            next_connection_id: Arc::new(AtomicU64::new(1)),
            connection_semaphore,
        }
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a reference to the orchestrator
    pub fn orchestrator(&self) -> &Arc<Orchestrator<E>> {
        &self.orchestrator
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let state = AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            next_connection_id: Arc::clone(&self.next_connection_id),
            connection_limit: self.connection_semaphore.clone(),
            outbound_buffer: self.config.outbound_buffer,
        };
        routes::router(state, &self.config)
    }

    /// Run the server
    ///
    /// This method blocks until the server fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Signaling server listening");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }
}
