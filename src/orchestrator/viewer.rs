//! Viewer join and negotiation

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{close_session, Orchestrator};
use crate::peer::{MediaEngine, PeerConnection, PeerError};
use crate::registry::{ConnectionId, DirectoryError, Role};
use crate::signal::{IceCandidate, ServerEvent, SessionDescription};

/// Sent to a viewer that asks to join before any track has arrived
pub const STREAM_NOT_READY: &str = "No broadcast stream available yet. Please try again in a moment.";

impl<E: MediaEngine> Orchestrator<E> {
    /// Start a viewer join
    ///
    /// Rejected with `no_broadcaster` when nobody is broadcasting and with an
    /// `error` when the broadcaster has not delivered a track yet. Otherwise
    /// the viewer gets a connection carrying the current tracks and an offer.
    pub async fn viewer_request(self: &Arc<Self>, id: ConnectionId) {
        let token = self.next_token();
        let reserved = self.directory.lock().await.reserve_viewer(id, token);

        let reservation = match reserved {
            Ok(reservation) => reservation,
            Err(DirectoryError::NoBroadcaster) => {
                tracing::info!(connection_id = %id, "Viewer rejected: no broadcaster");
                self.stats.join_rejected();
                self.hub.send(id, ServerEvent::NoBroadcaster).await;
                return;
            }
            Err(DirectoryError::StreamNotReady) => {
                tracing::info!(connection_id = %id, "Viewer rejected: stream not ready");
                self.stats.join_rejected();
                self.hub.send(id, ServerEvent::error(STREAM_NOT_READY)).await;
                return;
            }
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Ignoring viewer request");
                return;
            }
        };

        if let Some(previous) = reservation.replaced {
            tracing::debug!(connection_id = %id, "Replacing earlier viewer session");
            close_session(previous).await;
        }

        let cancel = reservation.cancel;
        match self
            .negotiate_viewer(id, token, reservation.snapshot, cancel.clone())
            .await
        {
            Ok(true) => {
                self.stats.viewer_joined();
                self.spawn_negotiation_watchdog(id, token, cancel);
            }
            Ok(false) => {}
            Err(e) => {
                let discarded = self.directory.lock().await.discard_viewer(id, token);
                // Already evicted by a teardown that notified the viewer
                let Some(session) = discarded else {
                    return;
                };
                close_session(session).await;
                self.fail_negotiation(id, "Failed to establish viewer connection", &e)
                    .await;
            }
        }
    }

    /// Build the viewer's connection and send its offer
    ///
    /// Returns false if the placeholder was evicted along the way.
    async fn negotiate_viewer(
        self: &Arc<Self>,
        id: ConnectionId,
        token: u64,
        snapshot: Vec<E::Track>,
        cancel: CancellationToken,
    ) -> Result<bool, PeerError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(
            self.engine
                .connect(Role::Viewer, &self.viewer_ice_servers, events_tx)
                .await?,
        );

        let bound = self
            .directory
            .lock()
            .await
            .bind_viewer_connection(id, token, Arc::clone(&connection));
        if !bound {
            tracing::debug!(connection_id = %id, token, "Viewer placeholder evicted");
            connection.close().await;
            return Ok(false);
        }
        self.spawn_event_pump(id, Role::Viewer, token, events_rx, cancel);

        for track in &snapshot {
            connection.attach_track(track).await?;
        }
        let offer = connection.local_offer().await?;

        let current = self
            .directory
            .lock()
            .await
            .viewer(id)
            .is_some_and(|v| v.token() == token);
        if !current {
            return Ok(false);
        }

        tracing::info!(connection_id = %id, tracks = snapshot.len(), "Viewer joined");
        self.hub.send(id, ServerEvent::ViewerOffer(offer)).await;
        Ok(true)
    }

    /// Evict the viewer if its first negotiation does not finish in time
    fn spawn_negotiation_watchdog(self: &Arc<Self>, id: ConnectionId, token: u64, cancel: CancellationToken) {
        let Some(timeout) = self.negotiation_timeout else {
            return;
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let expired = this.directory.lock().await.expire_viewer(id, token);
                    if let Some(session) = expired {
                        tracing::warn!(
                            connection_id = %id,
                            timeout_ms = timeout.as_millis() as u64,
                            "Viewer negotiation timed out"
                        );
                        close_session(session).await;
                        this.stats.negotiation_failed();
                        this.hub
                            .send(id, ServerEvent::error("Viewer negotiation timed out"))
                            .await;
                    }
                }
            }
        });
    }

    /// Complete a viewer negotiation
    ///
    /// Answers for a viewer that is not negotiating are ignored. Once the
    /// viewer is active, tracks that arrived in the meantime are fanned out.
    pub async fn viewer_answer(&self, id: ConnectionId, answer: SessionDescription) {
        let pending = {
            let directory = self.directory.lock().await;
            directory
                .viewer(id)
                .filter(|v| !v.is_active())
                .and_then(|v| v.connection().map(|c| (v.token(), c)))
        };
        let Some((token, connection)) = pending else {
            tracing::debug!(connection_id = %id, "No pending viewer negotiation for answer");
            return;
        };

        if let Err(e) = connection.apply_remote_description(answer).await {
            self.fail_negotiation(id, "Failed to complete viewer connection", &e)
                .await;
            return;
        }

        let activated = self.directory.lock().await.activate_viewer(id, token);
        if activated {
            tracing::debug!(connection_id = %id, "Viewer negotiation complete");
            self.fanout(Some(id)).await;
        }
    }

    /// Apply a candidate to a viewer's connection
    pub async fn viewer_candidate(&self, id: ConnectionId, candidate: IceCandidate) {
        let connection = self.directory.lock().await.viewer_connection(id);
        let Some((_, connection)) = connection else {
            tracing::debug!(connection_id = %id, "No viewer connection for candidate");
            return;
        };

        if let Err(e) = connection.add_ice_candidate(candidate).await {
            self.fail_negotiation(id, "Failed to apply ICE candidate", &e).await;
        }
    }
}
