//! Outbound signaling routes
//!
//! Every connected client, bound to a role or not, has one bounded outbound
//! queue registered here. The orchestrator addresses clients by
//! [`ConnectionId`] only and never sees the transport.
//!
//! Candidate relays are best-effort and dropped when a queue is full. Any
//! other event that does not fit means the client is too far behind to keep
//! its session: its overflow token is cancelled and the connection task
//! tears it down.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::message::ServerEvent;
use crate::registry::ConnectionId;

struct Route {
    tx: mpsc::Sender<ServerEvent>,
    overflow: CancellationToken,
}

/// Table of outbound queues keyed by connection
pub struct SignalHub {
    clients: RwLock<HashMap<ConnectionId, Route>>,
}

impl SignalHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a client and return the receiving end of its queue
    pub async fn register(&self, id: ConnectionId, capacity: usize) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let route = Route {
            tx,
            overflow: CancellationToken::new(),
        };
        self.clients.write().await.insert(id, route);
        rx
    }

    /// Token cancelled once a lifecycle event could not be queued for `id`
    pub async fn overflow_signal(&self, id: ConnectionId) -> Option<CancellationToken> {
        self.clients
            .read()
            .await
            .get(&id)
            .map(|route| route.overflow.clone())
    }

    /// Drop a client's queue
    pub async fn unregister(&self, id: ConnectionId) {
        self.clients.write().await.remove(&id);
    }

    /// Queue an event for one client
    ///
    /// Returns false if the client is gone or its queue is full.
    pub async fn send(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let clients = self.clients.read().await;
        match clients.get(&id) {
            Some(route) => Self::deliver(id, route, event),
            None => {
                tracing::debug!(connection_id = %id, event = event.name(), "No route to client");
                false
            }
        }
    }

    /// Queue an event for every client except `except`
    ///
    /// Returns the number of clients the event was queued for.
    pub async fn broadcast_except(&self, except: ConnectionId, event: ServerEvent) -> usize {
        let clients = self.clients.read().await;
        clients
            .iter()
            .filter(|(id, _)| **id != except)
            .filter(|(id, route)| Self::deliver(**id, route, event.clone()))
            .count()
    }

    /// Number of connected clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    fn deliver(id: ConnectionId, route: &Route, event: ServerEvent) -> bool {
        match route.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) if event.is_best_effort() => {
                tracing::debug!(
                    connection_id = %id,
                    event = event.name(),
                    "Outbound queue full, dropping candidate"
                );
                false
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    connection_id = %id,
                    event = event.name(),
                    "Outbound queue full, disconnecting client"
                );
                route.overflow.cancel();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::IceCandidate;

    #[tokio::test]
    async fn test_send_to_registered_client() {
        let hub = SignalHub::new();
        let mut rx = hub.register(ConnectionId::new(1), 8).await;

        assert!(hub.send(ConnectionId::new(1), ServerEvent::NoBroadcaster).await);
        assert_eq!(rx.recv().await, Some(ServerEvent::NoBroadcaster));

        // Unknown client is not an error
        assert!(!hub.send(ConnectionId::new(2), ServerEvent::NoBroadcaster).await);
    }

    #[tokio::test]
    async fn test_broadcast_except() {
        let hub = SignalHub::new();
        let mut a = hub.register(ConnectionId::new(1), 8).await;
        let mut b = hub.register(ConnectionId::new(2), 8).await;

        let sent = hub
            .broadcast_except(ConnectionId::new(1), ServerEvent::BroadcasterConnected)
            .await;

        assert_eq!(sent, 1);
        assert!(a.try_recv().is_err());
        assert_eq!(b.try_recv().ok(), Some(ServerEvent::BroadcasterConnected));
    }

    #[tokio::test]
    async fn test_full_queue_drops_candidates() {
        let hub = SignalHub::new();
        let id = ConnectionId::new(1);
        let mut rx = hub.register(id, 1).await;
        let overflow = hub.overflow_signal(id).await.unwrap();

        let candidate = ServerEvent::ViewerIceCandidate(IceCandidate::new("candidate:1"));
        assert!(hub.send(id, candidate.clone()).await);
        assert!(!hub.send(id, candidate.clone()).await);

        assert!(!overflow.is_cancelled());
        assert_eq!(rx.recv().await, Some(candidate));
    }

    #[tokio::test]
    async fn test_full_queue_flags_lifecycle_overflow() {
        let hub = SignalHub::new();
        let id = ConnectionId::new(1);
        let mut rx = hub.register(id, 1).await;
        let overflow = hub.overflow_signal(id).await.unwrap();

        assert!(hub.send(id, ServerEvent::BroadcasterConnected).await);
        assert!(!hub.send(id, ServerEvent::BroadcasterDisconnected).await);

        assert!(overflow.is_cancelled());
        assert_eq!(rx.recv().await, Some(ServerEvent::BroadcasterConnected));
    }

    #[test]
    fn test_receiver_wakes_on_send() {
        let hub = SignalHub::new();
        let id = ConnectionId::new(1);
        let mut rx = tokio_test::block_on(hub.register(id, 4));

        let mut recv = tokio_test::task::spawn(rx.recv());
        tokio_test::assert_pending!(recv.poll());

        assert!(tokio_test::block_on(hub.send(id, ServerEvent::NoBroadcaster)));
        assert!(recv.is_woken());
        tokio_test::assert_ready_eq!(recv.poll(), Some(ServerEvent::NoBroadcaster));
    }

    #[tokio::test]
    async fn test_unregister() {
        let hub = SignalHub::new();
        let _rx = hub.register(ConnectionId::new(1), 8).await;
        assert_eq!(hub.client_count().await, 1);

        hub.unregister(ConnectionId::new(1)).await;
        assert_eq!(hub.client_count().await, 0);
        assert!(hub.overflow_signal(ConnectionId::new(1)).await.is_none());
        assert_eq!(
            hub.broadcast_except(ConnectionId::new(2), ServerEvent::BroadcasterDisconnected)
                .await,
            0
        );
    }
}
