//! Broadcaster takeover and negotiation

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{close_session, Orchestrator};
use crate::peer::{MediaEngine, PeerConnection, PeerError};
use crate::registry::{ConnectionId, Role, Takeover};
use crate::signal::{IceCandidate, ServerEvent, SessionDescription};

impl<E: MediaEngine> Orchestrator<E> {
    /// Install `id` as the broadcaster
    ///
    /// Last writer wins. The previous broadcaster is told it was superseded
    /// and its negotiated connection is closed, but its signaling transport
    /// is left alone. Every other client learns a broadcaster is live.
    pub async fn declare_broadcaster(&self, id: ConnectionId) {
        let takeover = self.directory.lock().await.register_broadcaster(id);

        let Takeover::Installed {
            superseded,
            evicted,
            stopped_tracks,
        } = takeover
        else {
            tracing::debug!(connection_id = %id, "Broadcaster declared again");
            return;
        };
        self.stats.broadcaster_registered();

        match superseded {
            Some(previous) => {
                let previous_id = previous.id();
                tracing::info!(
                    connection_id = %id,
                    superseded = %previous_id,
                    stopped_tracks,
                    "Broadcaster superseded"
                );
                close_session(previous).await;
                self.hub.send(previous_id, ServerEvent::BroadcasterExists).await;
            }
            None => tracing::info!(connection_id = %id, "Broadcaster registered"),
        }

        self.evict_viewers(id, evicted).await;
        self.hub
            .broadcast_except(id, ServerEvent::BroadcasterConnected)
            .await;
    }

    /// Answer the broadcaster's offer
    ///
    /// Each offer starts a fresh negotiation: the previous connection is
    /// closed, the registry starts over empty and viewers fed by the old
    /// connection are evicted. Offers from anyone but the broadcaster are
    /// ignored.
    pub async fn broadcaster_offer(self: &Arc<Self>, id: ConnectionId, offer: SessionDescription) {
        let token = self.next_token();
        let restarted = self.directory.lock().await.restart_broadcaster(id, token);
        let restart = match restarted {
            Ok(restart) => restart,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Ignoring broadcaster offer");
                return;
            }
        };

        if let Some(previous) = restart.previous {
            tracing::info!(
                connection_id = %id,
                stopped_tracks = restart.stopped_tracks,
                "Restarting broadcaster negotiation"
            );
            previous.close().await;
        }
        self.evict_viewers(id, restart.evicted).await;

        if let Err(e) = self.negotiate_broadcaster(id, token, offer, restart.cancel).await {
            let aborted = self
                .directory
                .lock()
                .await
                .abort_broadcaster_negotiation(id, token);
            if let Some(connection) = aborted {
                connection.close().await;
            }
            self.fail_negotiation(id, "Failed to establish broadcaster connection", &e)
                .await;
        }
    }

    async fn negotiate_broadcaster(
        self: &Arc<Self>,
        id: ConnectionId,
        token: u64,
        offer: SessionDescription,
        cancel: CancellationToken,
    ) -> Result<(), PeerError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(
            self.engine
                .connect(Role::Broadcaster, &self.broadcaster_ice_servers, events_tx)
                .await?,
        );

        // Bind before negotiating so early candidates find the connection
        let bound = self
            .directory
            .lock()
            .await
            .bind_broadcaster_connection(id, token, Arc::clone(&connection));
        if !bound {
            tracing::debug!(connection_id = %id, token, "Broadcaster negotiation superseded");
            connection.close().await;
            return Ok(());
        }
        self.spawn_event_pump(id, Role::Broadcaster, token, events_rx, cancel);

        connection.apply_remote_description(offer).await?;
        let answer = connection.local_answer().await?;

        let activated = self.directory.lock().await.activate_broadcaster(id, token);
        if !activated {
            return Ok(());
        }
        tracing::info!(connection_id = %id, "Broadcaster negotiation complete");
        self.hub.send(id, ServerEvent::BroadcasterAnswer(answer)).await;
        Ok(())
    }

    /// Apply a candidate to the broadcaster's connection
    pub async fn broadcaster_candidate(&self, id: ConnectionId, candidate: IceCandidate) {
        let connection = self.directory.lock().await.broadcaster_connection(id);
        let Some(connection) = connection else {
            tracing::debug!(connection_id = %id, "No broadcaster connection for candidate");
            return;
        };

        if let Err(e) = connection.add_ice_candidate(candidate).await {
            self.fail_negotiation(id, "Failed to apply ICE candidate", &e).await;
        }
    }
}
