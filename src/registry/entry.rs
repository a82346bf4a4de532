//! Session entry and state types
//!
//! This module defines the per-connection state stored in the directory.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::peer::TrackKind;

/// Identifier of one signaling connection
///
/// Allocated from a process-wide counter, so identifiers are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw identifier
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw identifier
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a connection declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Broadcaster,
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Broadcaster => f.write_str("broadcaster"),
            Role::Viewer => f.write_str("viewer"),
        }
    }
}

/// Negotiation phase of a session
///
/// A connection without a session is unbound; a session that was released
/// is gone from the directory for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Offer/answer exchange in progress
    Negotiating,
    /// Negotiation completed
    Active,
}

/// Entry for one bound connection in the directory
pub struct PeerSession<C> {
    id: ConnectionId,
    role: Role,
    phase: SessionPhase,

    /// Distinguishes successive negotiated connections of the same client;
    /// events tagged with an older token are stale.
    token: u64,

    connection: Option<Arc<C>>,

    /// Track kinds already attached to this connection (viewers only)
    sent_kinds: BTreeSet<TrackKind>,

    /// Cancelled when the session is released; stops its event pump
    cancel: CancellationToken,

    activated_at: Option<Instant>,
}

impl<C> PeerSession<C> {
    /// Session for a freshly declared broadcaster (no connection yet)
    pub(crate) fn broadcaster(id: ConnectionId) -> Self {
        Self::new(id, Role::Broadcaster, 0, BTreeSet::new())
    }

    /// Placeholder session for a joining viewer
    pub(crate) fn viewer(id: ConnectionId, token: u64, sent_kinds: BTreeSet<TrackKind>) -> Self {
        Self::new(id, Role::Viewer, token, sent_kinds)
    }

    fn new(id: ConnectionId, role: Role, token: u64, sent_kinds: BTreeSet<TrackKind>) -> Self {
        Self {
            id,
            role,
            phase: SessionPhase::Negotiating,
            token,
            connection: None,
            sent_kinds,
            cancel: CancellationToken::new(),
            activated_at: None,
        }
    }

    /// Connection identifier
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Declared role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current phase
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Check if negotiation has completed
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Token of the current negotiated connection
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Negotiated connection, if one is bound
    pub fn connection(&self) -> Option<Arc<C>> {
        self.connection.clone()
    }

    /// Track kinds attached to this session's connection
    pub fn sent_kinds(&self) -> &BTreeSet<TrackKind> {
        &self.sent_kinds
    }

    /// Token cancelled when this session is released
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// When negotiation first completed
    pub fn activated_at(&self) -> Option<Instant> {
        self.activated_at
    }

    /// Record a kind as attached. Returns false if it already was.
    pub(crate) fn mark_sent(&mut self, kind: TrackKind) -> bool {
        self.sent_kinds.insert(kind)
    }

    pub(crate) fn unmark_sent(&mut self, kind: TrackKind) {
        self.sent_kinds.remove(&kind);
    }

    pub(crate) fn bind(&mut self, connection: Arc<C>) {
        self.connection = Some(connection);
    }

    pub(crate) fn activate(&mut self) {
        self.phase = SessionPhase::Active;
        if self.activated_at.is_none() {
            self.activated_at = Some(Instant::now());
        }
    }

    pub(crate) fn renegotiate(&mut self) {
        self.phase = SessionPhase::Negotiating;
    }

    /// Start over with a new negotiated connection
    ///
    /// Returns the previous connection so the caller can close it outside
    /// the directory lock.
    pub(crate) fn restart(&mut self, token: u64) -> Option<Arc<C>> {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.token = token;
        self.phase = SessionPhase::Negotiating;
        self.sent_kinds.clear();
        self.connection.take()
    }

    /// Drop the negotiated connection but keep the session
    pub(crate) fn unbind(&mut self) -> Option<Arc<C>> {
        self.cancel.cancel();
        self.connection.take()
    }

    /// Destroy the session
    ///
    /// Stops its event pump and hands back the connection to be closed.
    pub fn release(self) -> Option<Arc<C>> {
        self.cancel.cancel();
        self.connection
    }
}

impl<C> fmt::Debug for PeerSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("phase", &self.phase)
            .field("token", &self.token)
            .field("connected", &self.connection.is_some())
            .field("sent_kinds", &self.sent_kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_session_lifecycle() {
        let mut session: PeerSession<()> =
            PeerSession::viewer(ConnectionId::new(7), 3, BTreeSet::from([TrackKind::Video]));

        assert_eq!(session.role(), Role::Viewer);
        assert_eq!(session.phase(), SessionPhase::Negotiating);
        assert!(session.sent_kinds().contains(&TrackKind::Video));
        assert!(session.connection().is_none());

        session.bind(Arc::new(()));
        session.activate();
        assert!(session.is_active());
        assert!(session.activated_at().is_some());

        assert!(session.mark_sent(TrackKind::Audio));
        assert!(!session.mark_sent(TrackKind::Audio));
        assert_eq!(session.sent_kinds().len(), 2);

        let cancel = session.cancel_token();
        assert!(session.release().is_some());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_restart_replaces_connection() {
        let mut session: PeerSession<u8> = PeerSession::broadcaster(ConnectionId::new(1));
        session.bind(Arc::new(1));
        session.activate();
        let old_cancel = session.cancel_token();

        let previous = session.restart(9);

        assert_eq!(previous.as_deref(), Some(&1));
        assert!(old_cancel.is_cancelled());
        assert!(!session.cancel_token().is_cancelled());
        assert_eq!(session.token(), 9);
        assert_eq!(session.phase(), SessionPhase::Negotiating);
    }
}
