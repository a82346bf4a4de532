//! Inbound signaling dispatch

use std::sync::Arc;

use crate::orchestrator::Orchestrator;
use crate::peer::MediaEngine;
use crate::registry::ConnectionId;
use crate::signal::ClientEvent;

/// What the connection should do after an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading
    Continue,
    /// Client asked to disconnect
    Disconnect,
}

/// Routes inbound events to orchestration actions
pub struct Dispatcher<E: MediaEngine> {
    orchestrator: Arc<Orchestrator<E>>,
}

impl<E: MediaEngine> Dispatcher<E> {
    pub fn new(orchestrator: Arc<Orchestrator<E>>) -> Self {
        Self { orchestrator }
    }

    /// Parse and dispatch one text frame
    ///
    /// Malformed frames and unknown events are logged and dropped.
    pub async fn dispatch_text(&self, id: ConnectionId, text: &str) -> Flow {
        match ClientEvent::parse(text) {
            Ok(event) => self.dispatch(id, event).await,
            Err(e) => {
                tracing::warn!(connection_id = %id, error = %e, "Dropping signaling frame");
                Flow::Continue
            }
        }
    }

    /// Dispatch one event
    ///
    /// `disconnect` is not torn down here: the connection tears down once,
    /// whichever way it ends.
    pub async fn dispatch(&self, id: ConnectionId, event: ClientEvent) -> Flow {
        tracing::debug!(connection_id = %id, event = event.name(), "Signaling event");

        match event {
            ClientEvent::Broadcaster => self.orchestrator.declare_broadcaster(id).await,
            ClientEvent::BroadcasterOffer(offer) => {
                self.orchestrator.broadcaster_offer(id, offer).await
            }
            ClientEvent::BroadcasterIceCandidate(candidate) => {
                self.orchestrator.broadcaster_candidate(id, candidate).await
            }
            ClientEvent::ViewerRequest => self.orchestrator.viewer_request(id).await,
            ClientEvent::ViewerAnswer(answer) => self.orchestrator.viewer_answer(id, answer).await,
            ClientEvent::ViewerIceCandidate(candidate) => {
                self.orchestrator.viewer_candidate(id, candidate).await
            }
            ClientEvent::Disconnect => return Flow::Disconnect,
        }

        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::mock::MockEngine;
    use crate::server::ServerConfig;
    use crate::signal::{ServerEvent, SignalHub};
    use crate::stats::RelayStats;

    fn dispatcher() -> (Dispatcher<MockEngine>, Arc<SignalHub>) {
        let hub = Arc::new(SignalHub::new());
        let orchestrator = Arc::new(Orchestrator::new(
            MockEngine::new(),
            Arc::clone(&hub),
            Arc::new(RelayStats::new()),
            &ServerConfig::default(),
        ));
        (Dispatcher::new(orchestrator), hub)
    }

    #[tokio::test]
    async fn test_dispatch_routes_viewer_request() {
        let (dispatcher, hub) = dispatcher();
        let id = ConnectionId::new(1);
        let mut rx = hub.register(id, 8).await;

        let flow = dispatcher
            .dispatch_text(id, r#"{"event":"viewer_request"}"#)
            .await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(rx.recv().await, Some(ServerEvent::NoBroadcaster));
    }

    #[tokio::test]
    async fn test_dispatch_disconnect() {
        let (dispatcher, _hub) = dispatcher();

        let flow = dispatcher
            .dispatch_text(ConnectionId::new(1), r#"{"event":"disconnect"}"#)
            .await;
        assert_eq!(flow, Flow::Disconnect);
    }

    #[tokio::test]
    async fn test_dispatch_drops_malformed_frames() {
        let (dispatcher, hub) = dispatcher();
        let id = ConnectionId::new(1);
        let mut rx = hub.register(id, 8).await;

        let flow = dispatcher.dispatch_text(id, r#"{"event":"nope"}"#).await;
        assert_eq!(flow, Flow::Continue);
        let flow = dispatcher.dispatch_text(id, "{").await;
        assert_eq!(flow, Flow::Continue);

        assert!(rx.try_recv().is_err());
    }
}
