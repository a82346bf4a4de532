//! Signaling surface
//!
//! Wire events exchanged with browsers and the hub that routes outbound
//! events to individual clients.

pub mod hub;
pub mod message;

pub use hub::SignalHub;
pub use message::{
    ClientEvent, ErrorPayload, IceCandidate, SdpType, ServerEvent, SessionDescription, SignalError,
};
