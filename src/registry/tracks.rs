//! Broadcaster track registry
//!
//! Passive state: holds the tracks received from the current broadcaster.
//! Fan-out to viewers is driven by the orchestrator, never from here.

use std::collections::BTreeSet;

use crate::peer::{MediaTrack, TrackKind};

/// Tracks received from the broadcaster, in arrival order
#[derive(Debug)]
pub struct TrackRegistry<T> {
    tracks: Vec<T>,
}

impl<T: MediaTrack> TrackRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    /// Append a track
    pub fn add_track(&mut self, track: T) {
        self.tracks.push(track);
    }

    /// Check if any track has been received
    pub fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }

    /// Number of held tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Kinds of the held tracks
    pub fn kinds(&self) -> BTreeSet<TrackKind> {
        self.tracks.iter().map(MediaTrack::kind).collect()
    }

    /// All held tracks
    pub fn tracks(&self) -> &[T] {
        &self.tracks
    }

    /// The tracks that get propagated: the first one of each kind
    pub fn propagated(&self) -> Vec<T> {
        self.missing_from(&BTreeSet::new())
    }

    /// Propagated tracks whose kind is not in `sent`
    pub fn missing_from(&self, sent: &BTreeSet<TrackKind>) -> Vec<T> {
        let mut seen = sent.clone();
        self.tracks
            .iter()
            .filter(|track| seen.insert(track.kind()))
            .cloned()
            .collect()
    }

    /// Stop every track and empty the registry
    ///
    /// Returns the number of tracks stopped.
    pub fn clear(&mut self) -> usize {
        let count = self.tracks.len();
        for track in self.tracks.drain(..) {
            track.stop();
        }
        count
    }
}

impl<T: MediaTrack> Default for TrackRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::mock::MockTrack;

    #[test]
    fn test_add_and_kinds() {
        let mut registry = TrackRegistry::new();
        assert!(!registry.has_tracks());

        registry.add_track(MockTrack::video("v1"));
        registry.add_track(MockTrack::audio("a1"));

        assert!(registry.has_tracks());
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.kinds(),
            BTreeSet::from([TrackKind::Audio, TrackKind::Video])
        );
    }

    #[test]
    fn test_one_track_propagated_per_kind() {
        let mut registry = TrackRegistry::new();
        registry.add_track(MockTrack::video("v1"));
        registry.add_track(MockTrack::video("v2"));
        registry.add_track(MockTrack::audio("a1"));

        let ids: Vec<String> = registry
            .propagated()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(ids, vec!["v1", "a1"]);

        let missing = registry.missing_from(&BTreeSet::from([TrackKind::Video]));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id(), "a1");
    }

    #[test]
    fn test_clear_stops_tracks() {
        let mut registry = TrackRegistry::new();
        let video = MockTrack::video("v1");
        let audio = MockTrack::audio("a1");
        registry.add_track(video.clone());
        registry.add_track(audio.clone());

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
        assert!(video.is_stopped());
        assert!(audio.is_stopped());
    }
}
