//! Metadata pushed to system remote-control surfaces.

use aurora_core::{Locator, PlaybackSnapshot, PlaybackStatus, Result};

/// Lock-screen style description of the current track.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub cover: Option<Locator>,
    pub elapsed: f64,
    pub duration: Option<f64>,
    /// 1.0 while playing, 0.0 otherwise.
    pub playback_rate: f64,
    pub status: PlaybackStatus,
}

impl NowPlaying {
    /// `None` when no track is associated with the player.
    pub fn from_snapshot(snapshot: &PlaybackSnapshot) -> Option<Self> {
        let track = snapshot.track.as_ref()?;
        Some(Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            cover: track.cover.clone(),
            elapsed: snapshot.state.elapsed,
            duration: snapshot.state.duration.or(track.duration),
            playback_rate: snapshot.playback_rate(),
            status: snapshot.state.status,
        })
    }
}

/// A platform remote-control surface (lock screen, media notification,
/// desktop media keys).
///
/// Updates arrive on the bridge thread in the order the player changed.
pub trait RemoteSurface: Send {
    /// Show `now_playing`, or clear the surface when it is `None`.
    fn publish(&mut self, now_playing: Option<&NowPlaying>) -> Result<()>;
}
