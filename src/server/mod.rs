//! HTTP and WebSocket signaling server
//!
//! Every WebSocket connection at `/ws` is one signaling client. Inbound
//! frames are handed to the [`Dispatcher`]; outbound events queued on the
//! [`SignalHub`](crate::signal::SignalHub) are written back by a per-client
//! writer task. The same router serves the broadcaster and viewer pages,
//! health and status.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use dispatch::{Dispatcher, Flow};
pub use listener::RelayServer;
