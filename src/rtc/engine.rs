//! Peer connections built on `webrtc`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as CodecRegistry;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::track::RelayTrack;
use super::{
    candidate_from_init, candidate_init, connection_state, ice_server, ice_state,
    rtc_description, session_description,
};
use crate::peer::{
    IceServer, MediaEngine, MediaTrack, PeerConnection, PeerError, PeerEvent, PeerEventSender,
};
use crate::registry::Role;
use crate::signal::{IceCandidate, SessionDescription};

/// Default interval between keyframe requests to the broadcaster
pub const DEFAULT_KEYFRAME_INTERVAL: Duration = Duration::from_secs(3);

/// Engine creating `webrtc` peer connections
pub struct WebRtcEngine {
    api: Arc<API>,
    keyframe_interval: Duration,
}

impl WebRtcEngine {
    /// Create an engine with the default codecs and interceptors
    pub fn new() -> Result<Self, PeerError> {
        let mut codecs = CodecRegistry::default();
        codecs.register_default_codecs().map_err(setup_error)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut codecs).map_err(setup_error)?;

        let api = APIBuilder::new()
            .with_media_engine(codecs)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api: Arc::new(api),
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
        })
    }

    /// Set how often keyframes are requested from the broadcaster
    pub fn keyframe_interval(mut self, interval: Duration) -> Self {
        self.keyframe_interval = interval;
        self
    }
}

impl MediaEngine for WebRtcEngine {
    type Track = RelayTrack;
    type Connection = WebRtcConnection;

    async fn connect(
        &self,
        role: Role,
        ice_servers: &[IceServer],
        events: PeerEventSender<RelayTrack>,
    ) -> Result<WebRtcConnection, PeerError> {
        let config = RTCConfiguration {
            ice_servers: ice_servers.iter().map(ice_server).collect(),
            ..Default::default()
        };
        let pc = Arc::new(
            self.api
                .new_peer_connection(config)
                .await
                .map_err(setup_error)?,
        );

        register_handlers(&pc, role, events, self.keyframe_interval);
        tracing::debug!(role = %role, "Peer connection created");

        Ok(WebRtcConnection {
            pc,
            role,
            pending: Mutex::new(Some(Vec::new())),
        })
    }
}

/// Route the connection's callbacks into its event stream
fn register_handlers(
    pc: &Arc<RTCPeerConnection>,
    role: Role,
    events: PeerEventSender<RelayTrack>,
    keyframe_interval: Duration,
) {
    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            // None marks the end of gathering
            let Some(candidate) = candidate else {
                return;
            };
            match candidate.to_json() {
                Ok(init) => {
                    let _ = tx.send(PeerEvent::LocalCandidate(candidate_from_init(init)));
                }
                Err(e) => tracing::debug!(error = %e, "Failed to encode local candidate"),
            }
        })
    }));

    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let _ = tx.send(PeerEvent::StateChanged(connection_state(state)));
        Box::pin(async {})
    }));

    let tx = events.clone();
    pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let _ = tx.send(PeerEvent::IceStateChanged(ice_state(state)));
        Box::pin(async {})
    }));

    // Viewers only receive
    if role == Role::Broadcaster {
        let weak = Arc::downgrade(pc);
        pc.on_track(Box::new(move |remote: Arc<TrackRemote>, _receiver, _transceiver| {
            match RelayTrack::forward(remote, weak.clone(), keyframe_interval) {
                Some(track) => {
                    let _ = events.send(PeerEvent::Track(track));
                }
                None => tracing::debug!("Ignoring track of unspecified kind"),
            }
            Box::pin(async {})
        }));
    }
}

/// One `webrtc` peer connection
pub struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
    role: Role,
    /// Remote candidates received before the remote description.
    /// None once the description is applied.
    pending: Mutex<Option<Vec<RTCIceCandidateInit>>>,
}

impl WebRtcConnection {
    async fn install_local(
        &self,
        description: RTCSessionDescription,
    ) -> Result<SessionDescription, PeerError> {
        self.pc
            .set_local_description(description)
            .await
            .map_err(negotiation_error)?;
        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| PeerError::Negotiation("local description unavailable".into()))?;
        session_description(local)
    }
}

impl PeerConnection for WebRtcConnection {
    type Track = RelayTrack;

    async fn apply_remote_description(&self, description: SessionDescription) -> Result<(), PeerError> {
        let description = rtc_description(description)?;

        let mut pending = self.pending.lock().await;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| PeerError::Description(e.to_string()))?;

        if let Some(queued) = pending.take() {
            for candidate in queued {
                if let Err(e) = self.pc.add_ice_candidate(candidate).await {
                    tracing::debug!(role = %self.role, error = %e, "Dropping queued candidate");
                }
            }
        }
        Ok(())
    }

    async fn local_offer(&self) -> Result<SessionDescription, PeerError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(negotiation_error)?;
        self.install_local(offer).await
    }

    async fn local_answer(&self) -> Result<SessionDescription, PeerError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(negotiation_error)?;
        self.install_local(answer).await
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        let init = candidate_init(candidate);

        let mut pending = self.pending.lock().await;
        if let Some(queue) = pending.as_mut() {
            queue.push(init);
            return Ok(());
        }
        drop(pending);

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| PeerError::Candidate(e.to_string()))
    }

    async fn attach_track(&self, track: &RelayTrack) -> Result<(), PeerError> {
        if track.is_stopped() {
            return Err(PeerError::Track(format!("track {} is stopped", track.id())));
        }

        let local: Arc<dyn TrackLocal + Send + Sync> = Arc::clone(track.local()) as _;
        let sender = self
            .pc
            .add_track(local)
            .await
            .map_err(|e| PeerError::Track(e.to_string()))?;

        // Interceptors only run while RTCP is read
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::debug!(role = %self.role, error = %e, "Error closing peer connection");
        }
    }
}

fn setup_error(e: webrtc::Error) -> PeerError {
    PeerError::Setup(e.to_string())
}

fn negotiation_error(e: webrtc::Error) -> PeerError {
    PeerError::Negotiation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SdpType;
    use tokio::sync::mpsc;

    async fn viewer_connection() -> WebRtcConnection {
        let engine = WebRtcEngine::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        engine.connect(Role::Viewer, &[], tx).await.unwrap()
    }

    #[tokio::test]
    async fn test_viewer_offer_without_tracks() {
        let connection = viewer_connection().await;

        let offer = connection.local_offer().await.unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert!(offer.sdp.starts_with("v=0"));

        connection.close().await;
    }

    #[tokio::test]
    async fn test_candidates_queue_until_remote_description() {
        let connection = viewer_connection().await;

        connection
            .add_ice_candidate(IceCandidate::new(
                "candidate:1 1 udp 2122260223 192.0.2.10 50000 typ host",
            ))
            .await
            .unwrap();
        assert_eq!(connection.pending.lock().await.as_ref().map(Vec::len), Some(1));

        connection.close().await;
    }

    #[tokio::test]
    async fn test_garbage_description_is_rejected() {
        let connection = viewer_connection().await;

        let result = connection
            .apply_remote_description(SessionDescription::offer("not sdp"))
            .await;
        assert!(matches!(result, Err(PeerError::Description(_))));

        connection.close().await;
    }
}
