//! Single-broadcaster, multi-viewer WebRTC relay
//!
//! One broadcaster publishes audio and video; any number of viewers receive
//! that stream over their own negotiated peer connections. The server
//! tracks who is broadcasting, forwards the broadcaster's tracks to every
//! viewer connection and mediates the offer/answer/candidate exchange.
//!
//! ```no_run
//! use broadcast_relay::{RelayServer, ServerConfig, WebRtcEngine};
//!
//! # async fn run() -> broadcast_relay::Result<()> {
//! let engine = WebRtcEngine::new()?;
//! let server = RelayServer::new(ServerConfig::default(), engine);
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod error;
pub mod orchestrator;
pub mod peer;
pub mod registry;
pub mod rtc;
pub mod server;
pub mod signal;
pub mod stats;

pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use rtc::WebRtcEngine;
pub use server::{RelayServer, ServerConfig};
