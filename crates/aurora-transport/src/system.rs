//! OS media controls (MPRIS, SMTC, Now Playing) via `souvlaki`.

use std::thread::JoinHandle;
use std::time::Duration;

use aurora_core::{Error, PlaybackStatus, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use souvlaki::{MediaControlEvent, MediaMetadata, MediaPlayback, MediaPosition, SeekDirection};
use tracing::{debug, info, warn};

use crate::command::{RemoteCommand, RemoteCommander};
use crate::now_playing::{NowPlaying, RemoteSurface};

const DISPLAY_NAME: &str = "Aurora";
const DBUS_NAME: &str = "aurora";
/// Step used by platforms that send a bare seek direction.
const SEEK_STEP_SECS: f64 = 10.0;

/// Remote surface backed by the platform media-control service.
///
/// The platform handle lives on its own thread; this type only forwards
/// updates to it.
pub struct SystemControls {
    updates: Option<Sender<Option<NowPlaying>>>,
    thread: Option<JoinHandle<()>>,
}

impl SystemControls {
    /// Register with the OS and route its button presses to `commander`.
    pub fn start(commander: RemoteCommander) -> Result<Self> {
        let (tx, rx) = unbounded::<Option<NowPlaying>>();
        let thread = std::thread::Builder::new()
            .name("system-controls".to_string())
            .spawn(move || run(commander, &rx))
            .map_err(|e| Error::Internal(format!("Failed to spawn system controls: {e}")))?;

        Ok(Self {
            updates: Some(tx),
            thread: Some(thread),
        })
    }
}

impl RemoteSurface for SystemControls {
    fn publish(&mut self, now_playing: Option<&NowPlaying>) -> Result<()> {
        let Some(updates) = &self.updates else {
            return Err(Error::ChannelClosed);
        };
        updates
            .send(now_playing.cloned())
            .map_err(|_| Error::ChannelClosed)
    }
}

impl Drop for SystemControls {
    fn drop(&mut self) {
        self.updates.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(commander: RemoteCommander, updates: &Receiver<Option<NowPlaying>>) {
    let Some(mut controls) = create_controls(commander) else {
        // Keep draining so publishers never see a closed surface.
        for _ in updates {}
        return;
    };
    info!("System media controls registered");

    for now_playing in updates {
        publish(&mut controls, now_playing.as_ref());
    }
    debug!("System media controls released");
}

#[cfg(not(target_os = "windows"))]
fn create_controls(commander: RemoteCommander) -> Option<souvlaki::MediaControls> {
    let mut controls = match souvlaki::MediaControls::new(souvlaki::PlatformConfig {
        display_name: DISPLAY_NAME,
        dbus_name: DBUS_NAME,
        hwnd: None,
    }) {
        Ok(controls) => controls,
        Err(e) => {
            warn!("Failed to create media controls backend: {e:?}");
            return None;
        }
    };

    if let Err(e) = controls.attach(move |event| {
        if let Some(command) = map_event(event) {
            commander.handle(command);
        }
    }) {
        warn!("Failed to attach media controls handler: {e:?}");
        return None;
    }

    Some(controls)
}

#[cfg(target_os = "windows")]
fn create_controls(_commander: RemoteCommander) -> Option<souvlaki::MediaControls> {
    // SMTC needs a window handle, which a headless core does not own.
    warn!("Windows media controls are disabled without a window handle");
    None
}

fn publish(controls: &mut souvlaki::MediaControls, now_playing: Option<&NowPlaying>) {
    let Some(now) = now_playing else {
        if let Err(e) = controls.set_metadata(MediaMetadata::default()) {
            warn!("Failed to clear media metadata: {e:?}");
        }
        if let Err(e) = controls.set_playback(MediaPlayback::Stopped) {
            warn!("Failed to publish playback state: {e:?}");
        }
        return;
    };

    let metadata = MediaMetadata {
        title: Some(now.title.as_str()),
        artist: Some(now.artist.as_str()),
        album: now.album.as_deref(),
        cover_url: now.cover.as_ref().map(aurora_core::Locator::as_str),
        duration: now.duration.map(Duration::from_secs_f64),
    };
    if let Err(e) = controls.set_metadata(metadata) {
        warn!("Failed to publish media metadata: {e:?}");
    }

    let progress = Some(MediaPosition(Duration::from_secs_f64(now.elapsed.max(0.0))));
    let playback = match now.status {
        PlaybackStatus::Playing => MediaPlayback::Playing { progress },
        PlaybackStatus::Paused | PlaybackStatus::Loading => MediaPlayback::Paused { progress },
        PlaybackStatus::Idle | PlaybackStatus::Stopped => MediaPlayback::Stopped,
    };
    if let Err(e) = controls.set_playback(playback) {
        warn!("Failed to publish playback state: {e:?}");
    }
}

fn map_event(event: MediaControlEvent) -> Option<RemoteCommand> {
    match event {
        MediaControlEvent::Play => Some(RemoteCommand::Play),
        MediaControlEvent::Pause => Some(RemoteCommand::Pause),
        MediaControlEvent::Toggle => Some(RemoteCommand::TogglePlayPause),
        MediaControlEvent::Next => Some(RemoteCommand::Next),
        MediaControlEvent::Previous => Some(RemoteCommand::Previous),
        MediaControlEvent::Stop => Some(RemoteCommand::Stop),
        MediaControlEvent::SetPosition(MediaPosition(position)) => {
            Some(RemoteCommand::SeekTo(position.as_secs_f64()))
        }
        MediaControlEvent::SeekBy(direction, delta) => Some(RemoteCommand::SeekBy(signed(
            direction,
            delta.as_secs_f64(),
        ))),
        MediaControlEvent::Seek(direction) => {
            Some(RemoteCommand::SeekBy(signed(direction, SEEK_STEP_SECS)))
        }
        _ => None,
    }
}

fn signed(direction: SeekDirection, secs: f64) -> f64 {
    match direction {
        SeekDirection::Forward => secs,
        SeekDirection::Backward => -secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_maps_to_toggle() {
        assert_eq!(
            map_event(MediaControlEvent::Toggle),
            Some(RemoteCommand::TogglePlayPause)
        );
    }

    #[test]
    fn test_seek_directions_are_signed() {
        assert_eq!(
            map_event(MediaControlEvent::SeekBy(
                SeekDirection::Backward,
                Duration::from_secs(5)
            )),
            Some(RemoteCommand::SeekBy(-5.0))
        );
        assert_eq!(
            map_event(MediaControlEvent::Seek(SeekDirection::Forward)),
            Some(RemoteCommand::SeekBy(SEEK_STEP_SECS))
        );
    }

    #[test]
    fn test_set_position_is_absolute() {
        assert_eq!(
            map_event(MediaControlEvent::SetPosition(MediaPosition(
                Duration::from_millis(42_500)
            ))),
            Some(RemoteCommand::SeekTo(42.5))
        );
    }

    #[test]
    fn test_window_events_are_ignored() {
        assert_eq!(map_event(MediaControlEvent::Raise), None);
        assert_eq!(map_event(MediaControlEvent::Quit), None);
    }
}
