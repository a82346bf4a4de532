//! Signaling events and their JSON encoding
//!
//! Every WebSocket text frame carries exactly one event:
//!
//! ```text
//! {"event": "viewer_offer", "data": {"type": "offer", "sdp": "v=0..."}}
//! {"event": "viewer_request"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Offer or answer exchanged during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description type
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Connectivity candidate, in the shape browsers produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Media line index
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    /// ICE username fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Candidate with only the attribute line set
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Payload of the `error` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human readable message
    pub message: String,
}

/// Event sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Declare this connection as the broadcaster
    Broadcaster,
    /// Broadcaster's offer
    BroadcasterOffer(SessionDescription),
    /// Candidate from the broadcaster
    BroadcasterIceCandidate(IceCandidate),
    /// Ask to watch the stream
    ViewerRequest,
    /// Viewer's answer to a `viewer_offer`
    ViewerAnswer(SessionDescription),
    /// Candidate from a viewer
    ViewerIceCandidate(IceCandidate),
    /// Explicit disconnect
    Disconnect,
}

impl ClientEvent {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, SignalError> {
        serde_json::from_str(text).map_err(|e| SignalError::Malformed(e.to_string()))
    }

    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Broadcaster => "broadcaster",
            ClientEvent::BroadcasterOffer(_) => "broadcaster_offer",
            ClientEvent::BroadcasterIceCandidate(_) => "broadcaster_ice_candidate",
            ClientEvent::ViewerRequest => "viewer_request",
            ClientEvent::ViewerAnswer(_) => "viewer_answer",
            ClientEvent::ViewerIceCandidate(_) => "viewer_ice_candidate",
            ClientEvent::Disconnect => "disconnect",
        }
    }
}

/// Event sent to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// You have been superseded by a newer broadcaster
    BroadcasterExists,
    /// A broadcaster is live
    BroadcasterConnected,
    /// Answer to the broadcaster's offer
    BroadcasterAnswer(SessionDescription),
    /// Server-side candidate for the broadcaster connection
    BroadcasterIceCandidate(IceCandidate),
    /// Viewer join rejected, nobody is broadcasting
    NoBroadcaster,
    /// Offer for a viewer connection
    ViewerOffer(SessionDescription),
    /// Server-side candidate for a viewer connection
    ViewerIceCandidate(IceCandidate),
    /// The broadcaster left; viewer sessions are closed
    BroadcasterDisconnected,
    /// Generic failure
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Build an `error` event
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String, SignalError> {
        serde_json::to_string(self).map_err(|e| SignalError::Encode(e.to_string()))
    }

    /// Check if the event may be dropped when the client falls behind
    ///
    /// Only candidate relays qualify; losing any other event would leave the
    /// client's session out of step with the directory.
    pub fn is_best_effort(&self) -> bool {
        matches!(
            self,
            ServerEvent::BroadcasterIceCandidate(_) | ServerEvent::ViewerIceCandidate(_)
        )
    }

    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::BroadcasterExists => "broadcaster_exists",
            ServerEvent::BroadcasterConnected => "broadcaster_connected",
            ServerEvent::BroadcasterAnswer(_) => "broadcaster_answer",
            ServerEvent::BroadcasterIceCandidate(_) => "broadcaster_ice_candidate",
            ServerEvent::NoBroadcaster => "no_broadcaster",
            ServerEvent::ViewerOffer(_) => "viewer_offer",
            ServerEvent::ViewerIceCandidate(_) => "viewer_ice_candidate",
            ServerEvent::BroadcasterDisconnected => "broadcaster_disconnected",
            ServerEvent::Error(_) => "error",
        }
    }
}

/// Signaling codec errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Inbound frame is not a known event
    Malformed(String),
    /// Outbound event could not be encoded
    Encode(String),
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalError::Malformed(msg) => write!(f, "Malformed signaling frame: {}", msg),
            SignalError::Encode(msg) => write!(f, "Failed to encode event: {}", msg),
        }
    }
}

impl std::error::Error for SignalError {}
