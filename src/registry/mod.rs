//! Session directory for broadcaster/viewer routing
//!
//! The directory tracks which connection is broadcasting, which connections
//! are watching, and which tracks the broadcaster has delivered so far.
//!
//! # Architecture
//!
//! ```text
//!                     Mutex<SessionDirectory>
//!                 ┌───────────────────────────────┐
//!                 │ broadcaster: Option<Session>  │
//!                 │ tracks: TrackRegistry {       │
//!                 │   video, audio, ...           │
//!                 │ }                             │
//!                 │ viewers: HashMap<Id, Session> │
//!                 └───────────────┬───────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!   [Broadcaster]             [Viewer]                [Viewer]
//!   on_track() ──► add_broadcaster_track() ──► reserve_fanout()
//!                             sent_kinds              sent_kinds
//! ```
//!
//! # Invariants
//!
//! - Tracks exist only while a broadcaster is registered; the registry is
//!   cleared whenever the broadcaster slot empties or changes hands.
//! - A connection is either the broadcaster or a viewer, never both.
//! - Removing the broadcaster removes every viewer in the same step.
//! - A track kind is attached at most once per viewer.

pub mod entry;
pub mod error;
pub mod store;
pub mod tracks;

pub use entry::{ConnectionId, PeerSession, Role, SessionPhase};
pub use error::DirectoryError;
pub use store::{
    BroadcasterRestart, BroadcasterTeardown, Departure, FanoutTarget, SessionDirectory, Takeover,
    ViewerReservation,
};
pub use tracks::TrackRegistry;
