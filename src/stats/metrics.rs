//! Statistics and metrics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::peer::TrackKind;
use crate::registry::ConnectionId;

/// Relay-wide counters
///
/// Updated lock-free from the orchestrator and the listener.
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    broadcasters_total: AtomicU64,
    viewer_joins: AtomicU64,
    joins_rejected: AtomicU64,
    negotiation_failures: AtomicU64,
    tracks_received: AtomicU64,
    fanout_attachments: AtomicU64,
}

impl RelayStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            broadcasters_total: AtomicU64::new(0),
            viewer_joins: AtomicU64::new(0),
            joins_rejected: AtomicU64::new(0),
            negotiation_failures: AtomicU64::new(0),
            tracks_received: AtomicU64::new(0),
            fanout_attachments: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn broadcaster_registered(&self) {
        self.broadcasters_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn viewer_joined(&self) {
        self.viewer_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn join_rejected(&self) {
        self.joins_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn negotiation_failed(&self) {
        self.negotiation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_received(&self) {
        self.tracks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_fanned_out(&self) {
        self.fanout_attachments.fetch_add(1, Ordering::Relaxed);
    }

    /// Get time since the counters were created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Copy the current values
    pub fn counters(&self) -> RelayCounters {
        RelayCounters {
            uptime_secs: self.uptime().as_secs(),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            broadcasters_total: self.broadcasters_total.load(Ordering::Relaxed),
            viewer_joins: self.viewer_joins.load(Ordering::Relaxed),
            joins_rejected: self.joins_rejected.load(Ordering::Relaxed),
            negotiation_failures: self.negotiation_failures.load(Ordering::Relaxed),
            tracks_received: self.tracks_received.load(Ordering::Relaxed),
            fanout_attachments: self.fanout_attachments.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayCounters {
    pub uptime_secs: u64,
    pub connections_total: u64,
    pub connections_active: u64,
    pub broadcasters_total: u64,
    pub viewer_joins: u64,
    pub joins_rejected: u64,
    pub negotiation_failures: u64,
    pub tracks_received: u64,
    pub fanout_attachments: u64,
}

/// Point-in-time view of the session directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectorySnapshot {
    /// Current broadcaster
    pub broadcaster: Option<ConnectionId>,
    /// Whether the broadcaster finished negotiating
    pub broadcaster_active: bool,
    /// Viewer sessions, negotiating or active
    pub viewers: usize,
    /// Viewer sessions that finished negotiating
    pub active_viewers: usize,
    /// Kinds held by the track registry
    pub track_kinds: Vec<TrackKind>,
    /// Tracks held by the track registry
    pub tracks: usize,
}

/// Body of the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub directory: DirectorySnapshot,
    pub counters: RelayCounters,
}
