//! WebRTC media engine
//!
//! Production [`MediaEngine`](crate::peer::MediaEngine) backed by the
//! `webrtc` crate. The broadcaster's connection receives RTP; each remote
//! track is forwarded into a shared local track that viewer connections
//! attach, so media is read once and written to every viewer.
//!
//! ```text
//!  broadcaster pc ──on_track──► TrackRemote ──read_rtp──► TrackLocalStaticRTP
//!                                                          │       │
//!                                                   viewer pc   viewer pc
//! ```

pub mod engine;
pub mod track;

pub use engine::{WebRtcConnection, WebRtcEngine};
pub use track::RelayTrack;

use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::peer::{ConnectionState, IceServer, PeerError};
use crate::signal::{IceCandidate, SdpType, SessionDescription};

fn ice_server(server: &IceServer) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}

fn candidate_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}

fn candidate_from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, PeerError> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => {
            return Err(PeerError::Description("rollback is not supported".into()));
        }
    };
    parsed.map_err(|e| PeerError::Description(e.to_string()))
}

fn session_description(description: RTCSessionDescription) -> Result<SessionDescription, PeerError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(PeerError::Negotiation("unspecified description type".into()));
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

fn connection_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => ConnectionState::New,
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
    }
}

fn ice_state(state: RTCIceConnectionState) -> ConnectionState {
    match state {
        RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => ConnectionState::New,
        RTCIceConnectionState::Checking => ConnectionState::Connecting,
        RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
            ConnectionState::Connected
        }
        RTCIceConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCIceConnectionState::Failed => ConnectionState::Failed,
        RTCIceConnectionState::Closed => ConnectionState::Closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_server_credentials_map() {
        let server = IceServer::new("turn:relay.example.org:3478").with_credentials("u", "p");
        let rtc = ice_server(&server);

        assert_eq!(rtc.urls, vec!["turn:relay.example.org:3478".to_string()]);
        assert_eq!(rtc.username, "u");
        assert_eq!(rtc.credential, "p");

        let stun = ice_server(&IceServer::new("stun:stun.l.google.com:19302"));
        assert!(stun.username.is_empty());
    }

    #[test]
    fn test_candidate_conversion_keeps_fields() {
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: Some("frag".into()),
        };

        let back = candidate_from_init(candidate_init(candidate.clone()));
        assert_eq!(back, candidate);
    }

    #[test]
    fn test_rollback_is_rejected() {
        let rollback = SessionDescription {
            sdp_type: SdpType::Rollback,
            sdp: String::new(),
        };
        assert!(matches!(
            rtc_description(rollback),
            Err(PeerError::Description(_))
        ));
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(
            connection_state(RTCPeerConnectionState::Connected),
            ConnectionState::Connected
        );
        assert_eq!(ice_state(RTCIceConnectionState::Checking), ConnectionState::Connecting);
        assert_eq!(ice_state(RTCIceConnectionState::Completed), ConnectionState::Connected);
    }
}
