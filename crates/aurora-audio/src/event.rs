//! Notifications published by the player thread.

use aurora_core::{PlaybackSnapshot, Track};

/// Events delivered to subscribers, in the order the player produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Anything other than elapsed time changed.
    StateChanged(PlaybackSnapshot),
    /// A different track (or none) is now associated with the engine.
    TrackChanged(Option<Track>),
    /// Elapsed time moved, on the configured cadence or after a seek.
    Position { elapsed: f64, duration: Option<f64> },
    /// A track played to its natural end.
    TrackFinished(Track),
    /// A track could not be played. The state carries the same message.
    PlaybackFailed {
        track: Option<Track>,
        message: String,
    },
}
