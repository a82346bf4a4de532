//! Negotiated peer connections
//!
//! The orchestrator never talks to a media stack directly. It drives
//! connections through the [`MediaEngine`] and [`PeerConnection`] traits and
//! consumes everything the connection reports (received tracks, locally
//! gathered candidates, state changes) as an ordered stream of [`PeerEvent`]s.
//!
//! The production engine lives in [`crate::rtc`].

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::registry::Role;
use crate::signal::{IceCandidate, SessionDescription};

/// Kind of a media track
///
/// Kind doubles as the uniqueness key for propagation: at most one track per
/// kind is attached to any viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

/// A media track received from the broadcaster
///
/// Handles are cheap to clone; all clones refer to the same underlying track.
pub trait MediaTrack: Clone + Send + Sync + 'static {
    /// Track identifier as reported by the remote side
    fn id(&self) -> &str;

    /// Track kind
    fn kind(&self) -> TrackKind;

    /// Stop the track. Idempotent.
    fn stop(&self);
}

/// Connection state reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Event emitted by a negotiated connection
#[derive(Debug, Clone)]
pub enum PeerEvent<T> {
    /// A remote media track arrived
    Track(T),
    /// The local side gathered a connectivity candidate
    LocalCandidate(IceCandidate),
    /// Peer connection state changed
    StateChanged(ConnectionState),
    /// ICE connection state changed
    IceStateChanged(ConnectionState),
}

/// Sending half of a connection's event stream
pub type PeerEventSender<T> = mpsc::UnboundedSender<PeerEvent<T>>;

/// Receiving half of a connection's event stream
pub type PeerEventReceiver<T> = mpsc::UnboundedReceiver<PeerEvent<T>>;

/// STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URIs (`stun:`, `turn:` or `turns:`)
    pub urls: Vec<String>,
    /// TURN username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Server without credentials (typically STUN)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Attach TURN credentials
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

/// One negotiated connection (the broadcaster's, or one viewer's)
///
/// Implementations must queue candidates that arrive before the remote
/// description is applied instead of rejecting them.
pub trait PeerConnection: Send + Sync + 'static {
    /// Track type this connection can carry
    type Track: MediaTrack;

    /// Apply the remote session description
    fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;

    /// Create an offer, install it as the local description and return it
    fn local_offer(&self) -> impl Future<Output = Result<SessionDescription, PeerError>> + Send;

    /// Create an answer, install it as the local description and return it
    fn local_answer(&self) -> impl Future<Output = Result<SessionDescription, PeerError>> + Send;

    /// Apply a remote connectivity candidate
    fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), PeerError>> + Send;

    /// Attach a track for sending to the remote side
    fn attach_track(&self, track: &Self::Track) -> impl Future<Output = Result<(), PeerError>> + Send;

    /// Close the connection. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Factory for negotiated connections
pub trait MediaEngine: Send + Sync + 'static {
    /// Track type produced by broadcaster connections
    type Track: MediaTrack;

    /// Connection type
    type Connection: PeerConnection<Track = Self::Track>;

    /// Create a connection for the given role
    ///
    /// Everything the connection reports afterwards is delivered on `events`,
    /// in order.
    fn connect(
        &self,
        role: Role,
        ice_servers: &[IceServer],
        events: PeerEventSender<Self::Track>,
    ) -> impl Future<Output = Result<Self::Connection, PeerError>> + Send;
}

/// Errors raised by a negotiated connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// Connection could not be created
    Setup(String),
    /// Session description was rejected or is malformed
    Description(String),
    /// Offer or answer could not be produced
    Negotiation(String),
    /// Candidate could not be applied
    Candidate(String),
    /// Track could not be attached
    Track(String),
    /// Connection is already closed
    Closed,
}

impl fmt::Display for PeerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerError::Setup(msg) => write!(f, "Connection setup failed: {}", msg),
            PeerError::Description(msg) => write!(f, "Invalid session description: {}", msg),
            PeerError::Negotiation(msg) => write!(f, "Negotiation failed: {}", msg),
            PeerError::Candidate(msg) => write!(f, "ICE candidate rejected: {}", msg),
            PeerError::Track(msg) => write!(f, "Track attach failed: {}", msg),
            PeerError::Closed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for PeerError {}
