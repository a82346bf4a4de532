//! Per-client signaling connection
//!
//! One task reads frames and dispatches them; a writer task drains the
//! client's outbound queue. Teardown runs exactly once, after the read loop
//! ends for any reason, including the client's queue overflowing.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};

use super::dispatch::{Dispatcher, Flow};
use crate::orchestrator::Orchestrator;
use crate::peer::MediaEngine;
use crate::registry::ConnectionId;

/// Run a signaling connection to completion
pub async fn serve_socket<E: MediaEngine>(
    socket: WebSocket,
    id: ConnectionId,
    peer_addr: SocketAddr,
    orchestrator: Arc<Orchestrator<E>>,
    outbound_buffer: usize,
) {
    let hub = Arc::clone(orchestrator.hub());
    let stats = Arc::clone(orchestrator.stats());

    stats.connection_opened();
    tracing::info!(connection_id = %id, peer = %peer_addr, "Client connected");

    let mut outbound = hub.register(id, outbound_buffer).await;
    let overflow = hub.overflow_signal(id).await.unwrap_or_default();
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(connection_id = %id, error = %e, "Dropping outbound event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let dispatcher = Dispatcher::new(Arc::clone(&orchestrator));
    let mut fell_behind = false;
    loop {
        let frame = tokio::select! {
            _ = overflow.cancelled() => {
                tracing::warn!(connection_id = %id, "Client fell behind, closing connection");
                fell_behind = true;
                break;
            }
            frame = stream.next() => frame,
        };
        let Some(frame) = frame else {
            break;
        };

        match frame {
            Ok(Message::Text(text)) => {
                if dispatcher.dispatch_text(id, &text).await == Flow::Disconnect {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                tracing::debug!(connection_id = %id, "Ignoring binary frame");
            }
            // Ping/pong are answered by the transport
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Read error");
                break;
            }
        }
    }

    orchestrator.disconnect(id).await;
    // Dropping the route ends the writer once the queue is flushed
    hub.unregister(id).await;
    if fell_behind {
        // A client that stopped reading would never let the queue drain
        writer.abort();
    }
    let _ = writer.await;

    stats.connection_closed();
    tracing::info!(connection_id = %id, "Client disconnected");
}
