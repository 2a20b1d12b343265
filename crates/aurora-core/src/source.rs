//! Catalog and remote media-server collaborators.
//!
//! The playback core only needs track lists and stream locators; how a
//! source talks to its backend is its own business.

use serde::{Deserialize, Serialize};

use crate::{Error, Locator, Result, Track};

/// What to ask a [`MediaSource`] for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackQuery {
    /// Every track of a library, album or playlist.
    Library(String),
    /// Free-text search over titles and artists.
    Search(String),
    /// Most recently added tracks, newest first.
    RecentlyAdded { limit: usize },
}

/// External source of track metadata and stream locators.
pub trait MediaSource: Send + Sync {
    fn fetch_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>>;

    fn resolve_stream_locator(&self, track_id: &str) -> Result<Locator>;
}

/// In-memory catalog. Tracks are kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: Vec<(Option<String>, Track)>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track that belongs to no library.
    #[must_use]
    pub fn with_track(mut self, track: Track) -> Self {
        self.entries.push((None, track));
        self
    }

    /// Add a track to the named library.
    #[must_use]
    pub fn with_library_track(mut self, library_id: impl Into<String>, track: Track) -> Self {
        self.entries.push((Some(library_id.into()), track));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MediaSource for StaticSource {
    fn fetch_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>> {
        let tracks = match query {
            TrackQuery::Library(id) => self
                .entries
                .iter()
                .filter(|(library, _)| library.as_deref() == Some(id.as_str()))
                .map(|(_, track)| track.clone())
                .collect(),
            TrackQuery::Search(text) => {
                let needle = text.trim().to_lowercase();
                if needle.is_empty() {
                    return Err(Error::InvalidArgument("empty search query".to_string()));
                }
                self.entries
                    .iter()
                    .map(|(_, track)| track)
                    .filter(|track| {
                        track.title.to_lowercase().contains(&needle)
                            || track.artist.to_lowercase().contains(&needle)
                    })
                    .cloned()
                    .collect()
            }
            TrackQuery::RecentlyAdded { limit } => self
                .entries
                .iter()
                .rev()
                .take(*limit)
                .map(|(_, track)| track.clone())
                .collect(),
        };
        Ok(tracks)
    }

    fn resolve_stream_locator(&self, track_id: &str) -> Result<Locator> {
        self.entries
            .iter()
            .find(|(_, track)| track.id == track_id)
            .and_then(|(_, track)| track.stream.clone())
            .ok_or_else(|| Error::InvalidArgument(format!("no stream for track {track_id}")))
    }
}
