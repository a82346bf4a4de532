//! Peer events and track fanout

use super::Orchestrator;
use crate::peer::{MediaEngine, MediaTrack, PeerConnection, PeerEvent, TrackKind};
use crate::registry::{ConnectionId, FanoutTarget, Role};
use crate::signal::ServerEvent;

impl<E: MediaEngine> Orchestrator<E> {
    /// Handle one event reported by the connection of negotiation `token`
    pub(crate) async fn handle_peer_event(
        &self,
        id: ConnectionId,
        role: Role,
        token: u64,
        event: PeerEvent<E::Track>,
    ) {
        match event {
            PeerEvent::Track(track) => self.on_track(id, role, token, track).await,
            PeerEvent::LocalCandidate(candidate) => {
                let event = match role {
                    Role::Broadcaster => ServerEvent::BroadcasterIceCandidate(candidate),
                    Role::Viewer => ServerEvent::ViewerIceCandidate(candidate),
                };
                self.hub.send(id, event).await;
            }
            PeerEvent::StateChanged(state) => {
                tracing::debug!(connection_id = %id, role = %role, state = %state, "Connection state changed");
            }
            PeerEvent::IceStateChanged(state) => {
                tracing::debug!(connection_id = %id, role = %role, state = %state, "ICE state changed");
            }
        }
    }

    async fn on_track(&self, id: ConnectionId, role: Role, token: u64, track: E::Track) {
        if role != Role::Broadcaster {
            tracing::debug!(connection_id = %id, "Ignoring track from viewer");
            return;
        }

        let kind = track.kind();
        let track_id = track.id().to_string();
        let accepted = self
            .directory
            .lock()
            .await
            .add_broadcaster_track(id, token, track.clone());
        if !accepted {
            tracing::debug!(connection_id = %id, token, "Dropping track of stale negotiation");
            track.stop();
            return;
        }

        self.stats.track_received();
        tracing::info!(connection_id = %id, kind = %kind, track_id = %track_id, "Broadcaster track received");
        self.fanout(None).await;
    }

    /// Attach registry tracks that active viewers are still missing
    ///
    /// `only` restricts the pass to one viewer.
    pub(crate) async fn fanout(&self, only: Option<ConnectionId>) {
        let targets = self.directory.lock().await.reserve_fanout(only);
        for target in targets {
            self.deliver_fanout(target).await;
        }
    }

    async fn deliver_fanout(&self, target: FanoutTarget<E::Connection>) {
        let FanoutTarget {
            id,
            token,
            connection,
            tracks,
        } = target;

        let mut failed: Vec<TrackKind> = Vec::new();
        for track in &tracks {
            match connection.attach_track(track).await {
                Ok(()) => {
                    self.stats.track_fanned_out();
                    tracing::debug!(connection_id = %id, kind = %track.kind(), "Track fanned out");
                }
                Err(e) => {
                    tracing::warn!(connection_id = %id, kind = %track.kind(), error = %e, "Fanout attach failed");
                    failed.push(track.kind());
                }
            }
        }

        let attached_any = failed.len() < tracks.len();
        let offer_due = self
            .directory
            .lock()
            .await
            .settle_fanout(id, token, &failed, attached_any);
        if !offer_due {
            return;
        }

        match connection.local_offer().await {
            Ok(offer) => {
                self.hub.send(id, ServerEvent::ViewerOffer(offer)).await;
            }
            Err(e) => {
                // Keep the viewer on what it already receives
                self.directory.lock().await.activate_viewer(id, token);
                self.fail_negotiation(id, "Failed to renegotiate viewer connection", &e)
                    .await;
            }
        }
    }
}
