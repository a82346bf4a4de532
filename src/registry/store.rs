//! Session directory implementation
//!
//! The single table of bound connections: one broadcaster slot, the viewer
//! sessions, and the broadcaster's track registry. It performs no I/O and
//! never awaits; the orchestrator owns it behind one lock and closes
//! connections handed back from here after releasing that lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::entry::{ConnectionId, PeerSession, Role, SessionPhase};
use super::error::DirectoryError;
use super::tracks::TrackRegistry;
use crate::peer::{MediaTrack, PeerConnection, TrackKind};

/// Outcome of a broadcaster declaration
#[derive(Debug)]
pub enum Takeover<C> {
    /// The connection already was the broadcaster
    Unchanged,
    /// The connection is now the broadcaster
    Installed {
        /// Previous broadcaster session, to be notified and closed
        superseded: Option<PeerSession<C>>,
        /// Viewer sessions evicted by the change
        evicted: Vec<PeerSession<C>>,
        /// Number of tracks stopped
        stopped_tracks: usize,
    },
}

/// Result of unregistering the broadcaster
#[derive(Debug)]
pub struct BroadcasterTeardown<C> {
    /// The broadcaster's own session
    pub session: PeerSession<C>,
    /// Every viewer session, to be closed
    pub viewers: Vec<PeerSession<C>>,
    /// Number of tracks stopped
    pub stopped_tracks: usize,
}

/// What a disconnect removed from the directory
#[derive(Debug)]
pub enum Departure<C> {
    Broadcaster(BroadcasterTeardown<C>),
    Viewer(PeerSession<C>),
    /// Connection never bound a role
    Unbound,
}

/// State handed to a new broadcaster negotiation
#[derive(Debug)]
pub struct BroadcasterRestart<C> {
    /// Connection of the previous negotiation, to be closed
    pub previous: Option<Arc<C>>,
    /// Viewers that were fed by the previous negotiation
    pub evicted: Vec<PeerSession<C>>,
    /// Number of tracks stopped
    pub stopped_tracks: usize,
    /// Cancelled when this negotiation is superseded
    pub cancel: CancellationToken,
}

/// Placeholder reserved for a joining viewer
#[derive(Debug)]
pub struct ViewerReservation<C: PeerConnection> {
    /// Tracks the viewer's connection starts with
    pub snapshot: Vec<C::Track>,
    /// Cancelled when the placeholder is released
    pub cancel: CancellationToken,
    /// Earlier session of the same viewer, to be closed
    pub replaced: Option<PeerSession<C>>,
}

/// Tracks to attach to one active viewer
pub struct FanoutTarget<C: PeerConnection> {
    pub id: ConnectionId,
    pub token: u64,
    pub connection: Arc<C>,
    pub tracks: Vec<C::Track>,
}

/// Directory of bound connections
pub struct SessionDirectory<C: PeerConnection> {
    broadcaster: Option<PeerSession<C>>,
    viewers: HashMap<ConnectionId, PeerSession<C>>,
    tracks: TrackRegistry<C::Track>,
}

impl<C: PeerConnection> SessionDirectory<C> {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            broadcaster: None,
            viewers: HashMap::new(),
            tracks: TrackRegistry::new(),
        }
    }

    /// Current broadcaster, if any
    pub fn broadcaster_id(&self) -> Option<ConnectionId> {
        self.broadcaster.as_ref().map(PeerSession::id)
    }

    /// Check if `id` is the current broadcaster
    pub fn is_broadcaster(&self, id: ConnectionId) -> bool {
        self.broadcaster_id() == Some(id)
    }

    /// Broadcaster session
    pub fn broadcaster(&self) -> Option<&PeerSession<C>> {
        self.broadcaster.as_ref()
    }

    /// Viewer session
    pub fn viewer(&self, id: ConnectionId) -> Option<&PeerSession<C>> {
        self.viewers.get(&id)
    }

    /// Identifiers of all viewer sessions
    pub fn viewer_ids(&self) -> Vec<ConnectionId> {
        self.viewers.keys().copied().collect()
    }

    /// Number of viewer sessions
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Number of viewer sessions that completed negotiation
    pub fn active_viewer_count(&self) -> usize {
        self.viewers.values().filter(|s| s.is_active()).count()
    }

    /// The broadcaster's track registry
    pub fn tracks(&self) -> &TrackRegistry<C::Track> {
        &self.tracks
    }

    /// Role and phase bound to a connection
    pub fn phase_of(&self, id: ConnectionId) -> Option<(Role, SessionPhase)> {
        if let Some(b) = self.broadcaster.as_ref().filter(|b| b.id() == id) {
            return Some((Role::Broadcaster, b.phase()));
        }
        self.viewers.get(&id).map(|v| (Role::Viewer, v.phase()))
    }

    /// Install `id` as the broadcaster
    ///
    /// Last writer wins. A previous broadcaster is handed back for
    /// notification; its tracks are stopped and the viewers they fed are
    /// evicted. If `id` was watching, its viewer session is evicted too.
    pub fn register_broadcaster(&mut self, id: ConnectionId) -> Takeover<C> {
        if self.is_broadcaster(id) {
            return Takeover::Unchanged;
        }

        let mut evicted = Vec::new();
        if let Some(own) = self.viewers.remove(&id) {
            evicted.push(own);
        }

        let superseded = self.broadcaster.take();
        let mut stopped_tracks = 0;
        if superseded.is_some() {
            stopped_tracks = self.tracks.clear();
            evicted.extend(self.viewers.drain().map(|(_, session)| session));
        }

        self.broadcaster = Some(PeerSession::broadcaster(id));

        Takeover::Installed {
            superseded,
            evicted,
            stopped_tracks,
        }
    }

    /// Remove the broadcaster
    ///
    /// Releases the track registry and hands back every viewer session for
    /// eviction.
    pub fn unregister_broadcaster(
        &mut self,
        id: ConnectionId,
    ) -> Result<BroadcasterTeardown<C>, DirectoryError> {
        if !self.is_broadcaster(id) {
            return Err(DirectoryError::NotBroadcaster(id));
        }
        let session = self
            .broadcaster
            .take()
            .ok_or(DirectoryError::NotBroadcaster(id))?;

        let stopped_tracks = self.tracks.clear();
        let viewers = self.viewers.drain().map(|(_, session)| session).collect();

        Ok(BroadcasterTeardown {
            session,
            viewers,
            stopped_tracks,
        })
    }

    /// Remove a viewer session
    pub fn remove_viewer(&mut self, id: ConnectionId) -> Option<PeerSession<C>> {
        self.viewers.remove(&id)
    }

    /// Remove whatever `id` is bound to
    pub fn disconnect(&mut self, id: ConnectionId) -> Departure<C> {
        if let Ok(teardown) = self.unregister_broadcaster(id) {
            return Departure::Broadcaster(teardown);
        }
        match self.remove_viewer(id) {
            Some(session) => Departure::Viewer(session),
            None => Departure::Unbound,
        }
    }

    /// Begin a new negotiation for the broadcaster
    ///
    /// The registry starts over empty; viewers holding tracks of the previous
    /// negotiation are evicted.
    pub fn restart_broadcaster(
        &mut self,
        id: ConnectionId,
        token: u64,
    ) -> Result<BroadcasterRestart<C>, DirectoryError> {
        let session = self
            .broadcaster
            .as_mut()
            .filter(|b| b.id() == id)
            .ok_or(DirectoryError::NotBroadcaster(id))?;

        let previous = session.restart(token);
        let cancel = session.cancel_token();
        let stopped_tracks = self.tracks.clear();
        let evicted = self.viewers.drain().map(|(_, session)| session).collect();

        Ok(BroadcasterRestart {
            previous,
            evicted,
            stopped_tracks,
            cancel,
        })
    }

    fn broadcaster_with_token(&mut self, id: ConnectionId, token: u64) -> Option<&mut PeerSession<C>> {
        self.broadcaster
            .as_mut()
            .filter(|b| b.id() == id && b.token() == token)
    }

    /// Bind the connection of the current broadcaster negotiation
    pub fn bind_broadcaster_connection(
        &mut self,
        id: ConnectionId,
        token: u64,
        connection: Arc<C>,
    ) -> bool {
        match self.broadcaster_with_token(id, token) {
            Some(session) => {
                session.bind(connection);
                true
            }
            None => false,
        }
    }

    /// Mark the broadcaster negotiation complete
    pub fn activate_broadcaster(&mut self, id: ConnectionId, token: u64) -> bool {
        match self.broadcaster_with_token(id, token) {
            Some(session) => {
                session.activate();
                true
            }
            None => false,
        }
    }

    /// Abandon a failed broadcaster negotiation
    ///
    /// The broadcaster stays registered; its connection is handed back.
    pub fn abort_broadcaster_negotiation(&mut self, id: ConnectionId, token: u64) -> Option<Arc<C>> {
        self.broadcaster_with_token(id, token)
            .and_then(PeerSession::unbind)
    }

    /// Broadcaster connection, if `id` is the broadcaster
    pub fn broadcaster_connection(&self, id: ConnectionId) -> Option<Arc<C>> {
        self.broadcaster
            .as_ref()
            .filter(|b| b.id() == id)
            .and_then(PeerSession::connection)
    }

    /// Record a track received on the current broadcaster negotiation
    ///
    /// Returns false for tracks of a stale negotiation.
    pub fn add_broadcaster_track(&mut self, id: ConnectionId, token: u64, track: C::Track) -> bool {
        if self.broadcaster_with_token(id, token).is_none() {
            return false;
        }
        self.tracks.add_track(track);
        true
    }

    /// Reserve a placeholder session for a joining viewer
    ///
    /// Fails without touching the directory if nobody is broadcasting or no
    /// track has arrived yet.
    pub fn reserve_viewer(
        &mut self,
        id: ConnectionId,
        token: u64,
    ) -> Result<ViewerReservation<C>, DirectoryError> {
        if self.broadcaster.is_none() {
            return Err(DirectoryError::NoBroadcaster);
        }
        if self.is_broadcaster(id) {
            return Err(DirectoryError::RoleConflict(id));
        }
        if !self.tracks.has_tracks() {
            return Err(DirectoryError::StreamNotReady);
        }

        let snapshot = self.tracks.propagated();
        let kinds = snapshot.iter().map(MediaTrack::kind).collect();
        let replaced = self.viewers.remove(&id);

        let session = PeerSession::viewer(id, token, kinds);
        let cancel = session.cancel_token();
        self.viewers.insert(id, session);

        Ok(ViewerReservation {
            snapshot,
            cancel,
            replaced,
        })
    }

    fn viewer_with_token(&mut self, id: ConnectionId, token: u64) -> Option<&mut PeerSession<C>> {
        self.viewers.get_mut(&id).filter(|v| v.token() == token)
    }

    /// Bind the connection built for a reserved viewer
    ///
    /// Returns false if the placeholder was evicted in the meantime.
    pub fn bind_viewer_connection(&mut self, id: ConnectionId, token: u64, connection: Arc<C>) -> bool {
        match self.viewer_with_token(id, token) {
            Some(session) => {
                session.bind(connection);
                true
            }
            None => false,
        }
    }

    /// Viewer connection and its token
    pub fn viewer_connection(&self, id: ConnectionId) -> Option<(u64, Arc<C>)> {
        self.viewers
            .get(&id)
            .and_then(|v| v.connection().map(|c| (v.token(), c)))
    }

    /// Mark a viewer negotiation complete
    pub fn activate_viewer(&mut self, id: ConnectionId, token: u64) -> bool {
        match self.viewer_with_token(id, token) {
            Some(session) => {
                session.activate();
                true
            }
            None => false,
        }
    }

    /// Remove a viewer session if it still belongs to negotiation `token`
    pub fn discard_viewer(&mut self, id: ConnectionId, token: u64) -> Option<PeerSession<C>> {
        self.viewer_with_token(id, token)?;
        self.viewers.remove(&id)
    }

    /// Remove a viewer that never completed its first negotiation
    pub fn expire_viewer(&mut self, id: ConnectionId, token: u64) -> Option<PeerSession<C>> {
        let never_active = self
            .viewer_with_token(id, token)
            .is_some_and(|v| v.activated_at().is_none());
        if never_active {
            self.viewers.remove(&id)
        } else {
            None
        }
    }

    /// Work out which tracks each active viewer is missing
    ///
    /// Missing kinds are recorded as sent before any attach happens, so a
    /// kind is never scheduled twice for the same viewer. Targeted viewers
    /// move back to negotiating until they answer the follow-up offer.
    /// Viewers still negotiating are skipped; they are replayed once active.
    pub fn reserve_fanout(&mut self, only: Option<ConnectionId>) -> Vec<FanoutTarget<C>> {
        let tracks = &self.tracks;
        self.viewers
            .values_mut()
            .filter(|v| only.map_or(true, |id| v.id() == id))
            .filter(|v| v.is_active())
            .filter_map(|viewer| {
                let connection = viewer.connection()?;
                let missing = tracks.missing_from(viewer.sent_kinds());
                if missing.is_empty() {
                    return None;
                }
                for track in &missing {
                    viewer.mark_sent(track.kind());
                }
                viewer.renegotiate();
                Some(FanoutTarget {
                    id: viewer.id(),
                    token: viewer.token(),
                    connection,
                    tracks: missing,
                })
            })
            .collect()
    }

    /// Record the outcome of a fanout to one viewer
    ///
    /// Kinds that failed to attach become eligible again. If nothing was
    /// attached the viewer returns to active. Returns true if a follow-up
    /// offer is due.
    pub fn settle_fanout(
        &mut self,
        id: ConnectionId,
        token: u64,
        failed: &[TrackKind],
        attached_any: bool,
    ) -> bool {
        let Some(viewer) = self.viewer_with_token(id, token) else {
            return false;
        };
        for kind in failed {
            viewer.unmark_sent(*kind);
        }
        if !attached_any {
            viewer.activate();
        }
        attached_any
    }
}

impl<C: PeerConnection> Default for SessionDirectory<C> {
    fn default() -> Self {
        Self::new()
    }
}
