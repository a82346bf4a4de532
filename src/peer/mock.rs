//! In-memory media engine for tests
//!
//! Records every call made on its connections and lets tests inject peer
//! events as if the remote side had produced them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    IceServer, MediaEngine, MediaTrack, PeerConnection, PeerError, PeerEvent, PeerEventSender,
    TrackKind,
};
use crate::registry::Role;
use crate::signal::{IceCandidate, SessionDescription};

#[derive(Debug, Clone)]
pub(crate) struct MockTrack {
    id: String,
    kind: TrackKind,
    stopped: Arc<AtomicBool>,
}

impl MockTrack {
    pub(crate) fn video(id: &str) -> Self {
        Self::new(id, TrackKind::Video)
    }

    pub(crate) fn audio(id: &str) -> Self {
        Self::new(id, TrackKind::Audio)
    }

    fn new(id: &str, kind: TrackKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for MockTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Everything observed on one mock connection
#[derive(Debug, Default)]
pub(crate) struct MockPeer {
    pub(crate) role: Option<Role>,
    pub(crate) ice_servers: Vec<IceServer>,
    events: Mutex<Option<PeerEventSender<MockTrack>>>,
    attached: Mutex<Vec<(String, TrackKind)>>,
    remote: Mutex<Vec<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    offers: AtomicUsize,
    answers: AtomicUsize,
    closed: AtomicBool,
    rejected_attaches: AtomicUsize,
    fail_remote: AtomicBool,
    fail_attach: AtomicBool,
    fail_offer: AtomicBool,
    fail_candidate: AtomicBool,
}

impl MockPeer {
    /// Deliver an event as if the engine had produced it
    pub(crate) fn emit(&self, event: PeerEvent<MockTrack>) {
        if let Some(tx) = self.events.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub(crate) fn attached(&self) -> Vec<(String, TrackKind)> {
        self.attached.lock().unwrap().clone()
    }

    pub(crate) fn attached_kinds(&self) -> Vec<TrackKind> {
        self.attached().into_iter().map(|(_, kind)| kind).collect()
    }

    pub(crate) fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub(crate) fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().unwrap().clone()
    }

    pub(crate) fn offers(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub(crate) fn answers(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_remote_description(&self) {
        self.fail_remote.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_attach(&self, fail: bool) {
        self.fail_attach.store(fail, Ordering::SeqCst);
    }

    /// Number of attach calls refused while `fail_attach` was set
    pub(crate) fn rejected_attaches(&self) -> usize {
        self.rejected_attaches.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_offer(&self, fail: bool) {
        self.fail_offer.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_candidate(&self, fail: bool) {
        self.fail_candidate.store(fail, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub(crate) struct MockConnection {
    peer: Arc<MockPeer>,
}

impl MockConnection {
    /// Connection not created through an engine
    pub(crate) fn detached() -> Self {
        Self {
            peer: Arc::new(MockPeer::default()),
        }
    }

    fn describe(&self, label: &str, count: usize) -> String {
        let kinds: Vec<String> = self
            .peer
            .attached_kinds()
            .iter()
            .map(|k| format!("m={}", k))
            .collect();
        format!("mock-{}-{} {}", label, count, kinds.join(" "))
    }
}

impl PeerConnection for MockConnection {
    type Track = MockTrack;

    async fn apply_remote_description(&self, description: SessionDescription) -> Result<(), PeerError> {
        if self.peer.fail_remote.load(Ordering::SeqCst) {
            return Err(PeerError::Description("rejected by mock".into()));
        }
        self.peer.remote.lock().unwrap().push(description);
        Ok(())
    }

    async fn local_offer(&self) -> Result<SessionDescription, PeerError> {
        if self.peer.fail_offer.load(Ordering::SeqCst) {
            return Err(PeerError::Negotiation("rejected by mock".into()));
        }
        let n = self.peer.offers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::offer(self.describe("offer", n)))
    }

    async fn local_answer(&self) -> Result<SessionDescription, PeerError> {
        let n = self.peer.answers.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionDescription::answer(self.describe("answer", n)))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
        if self.peer.fail_candidate.load(Ordering::SeqCst) {
            return Err(PeerError::Candidate("rejected by mock".into()));
        }
        self.peer.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn attach_track(&self, track: &MockTrack) -> Result<(), PeerError> {
        if self.peer.fail_attach.load(Ordering::SeqCst) {
            self.peer.rejected_attaches.fetch_add(1, Ordering::SeqCst);
            return Err(PeerError::Track("rejected by mock".into()));
        }
        self.peer
            .attached
            .lock()
            .unwrap()
            .push((track.id().to_string(), track.kind()));
        Ok(())
    }

    async fn close(&self) {
        self.peer.closed.store(true, Ordering::SeqCst);
        self.peer.events.lock().unwrap().take();
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockEngine {
    peers: Arc<Mutex<Vec<Arc<MockPeer>>>>,
    fail_connect: Arc<AtomicBool>,
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Connections created so far, in creation order
    pub(crate) fn peers(&self) -> Vec<Arc<MockPeer>> {
        self.peers.lock().unwrap().clone()
    }

    pub(crate) fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Most recent connection created for `role`
    pub(crate) fn last(&self, role: Role) -> Option<Arc<MockPeer>> {
        self.peers()
            .into_iter()
            .rev()
            .find(|p| p.role == Some(role))
    }

    pub(crate) fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }
}

impl MediaEngine for MockEngine {
    type Track = MockTrack;
    type Connection = MockConnection;

    async fn connect(
        &self,
        role: Role,
        ice_servers: &[IceServer],
        events: PeerEventSender<MockTrack>,
    ) -> Result<MockConnection, PeerError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PeerError::Setup("rejected by mock".into()));
        }
        let peer = Arc::new(MockPeer {
            role: Some(role),
            ice_servers: ice_servers.to_vec(),
            events: Mutex::new(Some(events)),
            ..Default::default()
        });
        self.peers.lock().unwrap().push(Arc::clone(&peer));
        Ok(MockConnection { peer })
    }
}
