//! Broadcast orchestration
//!
//! The [`Orchestrator`] owns the session directory and drives every
//! transition of the broadcaster and viewer lifecycles:
//!
//! ```text
//! Unbound ──broadcaster──► BroadcasterNegotiating ──answer sent──► BroadcasterActive
//! Unbound ──viewer_request──► ViewerNegotiating ──viewer_answer──► ViewerActive
//!                                   ▲                                  │
//!                                   └────── fanout re-offer ◄──────────┘
//! ```
//!
//! Directory mutations happen under one lock and never across an await.
//! Negotiation work (creating offers and answers, attaching tracks) runs
//! outside the lock against sessions reserved beforehand, and every result
//! is checked against the session token before it is committed.

mod broadcaster;
mod events;
mod viewer;


use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::peer::{IceServer, MediaEngine, PeerConnection, PeerError, PeerEventReceiver};
use crate::registry::{ConnectionId, Departure, PeerSession, Role, SessionDirectory};
use crate::server::config::ServerConfig;
use crate::signal::{ServerEvent, SignalHub};
use crate::stats::{DirectorySnapshot, RelayStats};

/// Connection lifecycle state machine
pub struct Orchestrator<E: MediaEngine> {
    engine: E,
    hub: Arc<SignalHub>,
    directory: Mutex<SessionDirectory<E::Connection>>,
    broadcaster_ice_servers: Vec<IceServer>,
    viewer_ice_servers: Vec<IceServer>,
    negotiation_timeout: Option<Duration>,
    stats: Arc<RelayStats>,
    next_token: AtomicU64,
}

impl<E: MediaEngine> Orchestrator<E> {
    /// Create an orchestrator with an empty directory
    pub fn new(engine: E, hub: Arc<SignalHub>, stats: Arc<RelayStats>, config: &ServerConfig) -> Self {
        Self {
            engine,
            hub,
            directory: Mutex::new(SessionDirectory::new()),
            broadcaster_ice_servers: config.broadcaster_ice_servers.clone(),
            viewer_ice_servers: config.viewer_ice_servers.clone(),
            negotiation_timeout: config.negotiation_timeout,
            stats,
            next_token: AtomicU64::new(1),
        }
    }

    /// Outbound signaling routes
    pub fn hub(&self) -> &Arc<SignalHub> {
        &self.hub
    }

    /// Relay counters
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Point-in-time view of the directory
    pub async fn snapshot(&self) -> DirectorySnapshot {
        let directory = self.directory.lock().await;
        DirectorySnapshot {
            broadcaster: directory.broadcaster_id(),
            broadcaster_active: directory.broadcaster().is_some_and(PeerSession::is_active),
            viewers: directory.viewer_count(),
            active_viewers: directory.active_viewer_count(),
            track_kinds: directory.tracks().kinds().into_iter().collect(),
            tracks: directory.tracks().len(),
        }
    }

    /// Tear down whatever `id` is bound to
    ///
    /// A departing broadcaster takes every viewer with it: the registry is
    /// cleared, all viewer connections are closed and everyone left is told
    /// the broadcast is over. Unbound connections are a no-op.
    pub async fn disconnect(&self, id: ConnectionId) {
        let departure = self.directory.lock().await.disconnect(id);

        match departure {
            Departure::Broadcaster(teardown) => {
                tracing::info!(
                    connection_id = %id,
                    viewers = teardown.viewers.len(),
                    stopped_tracks = teardown.stopped_tracks,
                    "Broadcaster disconnected"
                );
                close_session(teardown.session).await;
                for viewer in teardown.viewers {
                    close_session(viewer).await;
                }
                self.hub
                    .broadcast_except(id, ServerEvent::BroadcasterDisconnected)
                    .await;
            }
            Departure::Viewer(session) => {
                tracing::info!(connection_id = %id, phase = ?session.phase(), "Viewer left");
                close_session(session).await;
            }
            Departure::Unbound => {
                tracing::debug!(connection_id = %id, "Unbound connection left");
            }
        }
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Close viewer sessions fed by a broadcaster connection that went away
    async fn evict_viewers(&self, except: ConnectionId, viewers: Vec<PeerSession<E::Connection>>) {
        if viewers.is_empty() {
            return;
        }
        tracing::info!(count = viewers.len(), "Evicting viewers");

        for viewer in viewers {
            let id = viewer.id();
            close_session(viewer).await;
            if id != except {
                self.hub.send(id, ServerEvent::BroadcasterDisconnected).await;
            }
        }
    }

    /// Log a negotiation failure and report it to the client
    async fn fail_negotiation(&self, id: ConnectionId, message: &str, error: &PeerError) {
        tracing::warn!(connection_id = %id, error = %error, "{}", message);
        self.stats.negotiation_failed();
        self.hub.send(id, ServerEvent::error(message)).await;
    }

    /// Consume a connection's events until its session is released
    fn spawn_event_pump(
        self: &Arc<Self>,
        id: ConnectionId,
        role: Role,
        token: u64,
        mut events: PeerEventReceiver<E::Track>,
        cancel: CancellationToken,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => this.handle_peer_event(id, role, token, event).await,
                        None => break,
                    },
                }
            }
            tracing::debug!(connection_id = %id, role = %role, token, "Peer event pump stopped");
        });
    }
}

/// Release a session and close its connection
async fn close_session<C: PeerConnection>(session: PeerSession<C>) {
    if let Some(connection) = session.release() {
        connection.close().await;
    }
}
