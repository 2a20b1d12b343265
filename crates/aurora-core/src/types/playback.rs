//! Playback state shared between the engine and its observers.

use serde::{Deserialize, Serialize};

use super::{RepeatMode, Track};

/// Lifecycle of the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// Nothing loaded.
    #[default]
    Idle,
    /// Resolving audio bytes for the current track.
    Loading,
    Playing,
    Paused,
    /// A track is associated but not playing (end of queue or failed load).
    Stopped,
}

impl PlaybackStatus {
    /// Whether transport operations such as seek apply.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Numeric playback state. The engine is the only writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    /// Elapsed time in seconds.
    pub elapsed: f64,
    /// Total duration in seconds (if known).
    pub duration: Option<f64>,
    pub repeat: RepeatMode,
    pub shuffle: bool,
    /// Output volume (0.0 to 1.0).
    pub volume: f32,
    /// Last playback failure, cleared when the next load succeeds.
    pub error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            elapsed: 0.0,
            duration: None,
            repeat: RepeatMode::Off,
            shuffle: false,
            volume: 0.85,
            error: None,
        }
    }
}

/// Consolidated read-only view handed to observers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    /// Track associated with the engine, if any.
    pub track: Option<Track>,
    /// Queue cursor.
    pub cursor: Option<usize>,
    pub queue_len: usize,
}

impl PlaybackSnapshot {
    pub const fn is_playing(&self) -> bool {
        matches!(self.state.status, PlaybackStatus::Playing)
    }

    /// Rate reported to now-playing surfaces.
    pub const fn playback_rate(&self) -> f64 {
        if self.is_playing() {
            1.0
        } else {
            0.0
        }
    }

    /// Fraction of the track played, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        match self.state.duration {
            Some(duration) if duration > 0.0 => (self.state.elapsed / duration).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}
