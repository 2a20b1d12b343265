//! Track type representing a single playable song.

use serde::{Deserialize, Serialize};

use super::Locator;

/// Immutable identity record for a song, produced by a catalog or remote source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    /// Unique track ID.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Artist name.
    pub artist: String,
    /// Album name (if known).
    pub album: Option<String>,
    /// Duration in seconds (if known before decoding).
    pub duration: Option<f64>,
    /// Where the audio bytes live.
    pub stream: Option<Locator>,
    /// Where the cover art lives.
    pub cover: Option<Locator>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration: None,
            stream: None,
            cover: None,
        }
    }

    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    #[must_use]
    pub const fn with_duration(mut self, secs: f64) -> Self {
        self.duration = Some(secs);
        self
    }

    #[must_use]
    pub fn with_stream(mut self, locator: impl Into<Locator>) -> Self {
        self.stream = Some(locator.into());
        self
    }

    #[must_use]
    pub fn with_cover(mut self, locator: impl Into<Locator>) -> Self {
        self.cover = Some(locator.into());
        self
    }

    /// Get album name if available.
    pub fn album_name(&self) -> Option<&str> {
        self.album.as_deref()
    }

    /// Check whether the track can be resolved to audio bytes at all.
    pub const fn is_playable(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_creation() {
        let track = Track::new("abc123", "Test Song", "Test Artist");
        assert_eq!(track.id, "abc123");
        assert_eq!(track.title, "Test Song");
        assert!(!track.is_playable());
        assert!(track.album_name().is_none());
    }

    #[test]
    fn test_track_builders() {
        let track = Track::new("1", "Sunny Day", "Jay")
            .with_album("Ye Hui Mei")
            .with_duration(269.0)
            .with_stream("https://example.com/1.mp3");
        assert_eq!(track.album_name(), Some("Ye Hui Mei"));
        assert_eq!(track.duration, Some(269.0));
        assert!(track.is_playable());
    }
}
