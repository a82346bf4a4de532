//! HTTP routes

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use super::config::ServerConfig;
use super::connection::serve_socket;
use crate::orchestrator::Orchestrator;
use crate::peer::MediaEngine;
use crate::registry::ConnectionId;
use crate::stats::StatusReport;

/// Shared state of the HTTP handlers
pub struct AppState<E: MediaEngine> {
    pub orchestrator: Arc<Orchestrator<E>>,
    pub next_connection_id: Arc<AtomicU64>,
    pub connection_limit: Option<Arc<Semaphore>>,
    pub outbound_buffer: usize,
}

impl<E: MediaEngine> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            next_connection_id: Arc::clone(&self.next_connection_id),
            connection_limit: self.connection_limit.clone(),
            outbound_buffer: self.outbound_buffer,
        }
    }
}

/// Build the router
///
/// | Route        | Purpose                          |
/// |--------------|----------------------------------|
/// | `/ws`        | signaling WebSocket              |
/// | `/broadcast` | broadcaster page                 |
/// | `/view`      | viewer page                      |
/// | `/`          | redirect to `/view`              |
/// | `/health`    | liveness                         |
/// | `/stats`     | directory snapshot and counters  |
pub fn router<E: MediaEngine>(state: AppState<E>, config: &ServerConfig) -> Router {
    let pages = &config.static_dir;

    Router::new()
        .route("/ws", get(signaling::<E>))
        .route("/", get(|| async { Redirect::temporary("/view") }))
        .route_service("/broadcast", ServeFile::new(pages.join("broadcast.html")))
        .route_service("/view", ServeFile::new(pages.join("viewer.html")))
        .route("/health", get(health))
        .route("/stats", get(status::<E>))
        .fallback_service(ServeDir::new(pages))
        .layer(cors_layer(config.allowed_origin.as_deref()))
        .with_state(state)
}

async fn signaling<E: MediaEngine>(
    ws: WebSocketUpgrade,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState<E>>,
) -> Response {
    // Check connection limit
    let permit = match &state.connection_limit {
        Some(limit) => match Arc::clone(limit).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        },
        None => None,
    };

    let id = ConnectionId::new(state.next_connection_id.fetch_add(1, Ordering::Relaxed));
    tracing::debug!(connection_id = %id, peer = %peer_addr, "Upgrading signaling connection");

    ws.on_upgrade(move |socket| async move {
        serve_socket(socket, id, peer_addr, state.orchestrator, state.outbound_buffer).await;
        drop(permit);
    })
}

async fn health() -> &'static str {
    "OK"
}

async fn status<E: MediaEngine>(State(state): State<AppState<E>>) -> Json<StatusReport> {
    Json(StatusReport {
        directory: state.orchestrator.snapshot().await,
        counters: state.orchestrator.stats().counters(),
    })
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let Some(origin) = origin else {
        return CorsLayer::permissive();
    };

    match HeaderValue::from_str(origin) {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods([Method::GET, Method::POST])
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!(origin = %origin, "Invalid CORS origin, allowing any");
            CorsLayer::permissive()
        }
    }
}
