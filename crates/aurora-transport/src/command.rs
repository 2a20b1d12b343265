//! Inbound commands from remote-control surfaces.

use aurora_audio::PlayerHandle;
use aurora_core::{PlaybackStatus, Result};
use tracing::{debug, warn};

/// A transport button or gesture from outside the app.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    TogglePlayPause,
    Next,
    Previous,
    Stop,
    /// Absolute position in seconds.
    SeekTo(f64),
    /// Relative jump in seconds, negative to rewind.
    SeekBy(f64),
}

/// Outcome reported back to the surface that sent a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// The command was valid but did nothing, e.g. pause while paused.
    Failed,
}

impl CommandStatus {
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Maps remote commands onto the player.
///
/// Internally pause-while-paused is a harmless no-op; remote surfaces are
/// told it failed so their UI can reflect the rejection.
#[derive(Clone)]
pub struct RemoteCommander {
    player: PlayerHandle,
}

impl RemoteCommander {
    pub const fn new(player: PlayerHandle) -> Self {
        Self { player }
    }

    pub fn handle(&self, command: RemoteCommand) -> CommandStatus {
        debug!("Remote command: {command:?}");
        match self.apply(command) {
            Ok(true) => CommandStatus::Success,
            Ok(false) => {
                debug!("Remote command {command:?} had no effect");
                CommandStatus::Failed
            }
            Err(e) => {
                warn!("Remote command {command:?} failed: {e}");
                CommandStatus::Failed
            }
        }
    }

    fn apply(&self, command: RemoteCommand) -> Result<bool> {
        match command {
            RemoteCommand::Play => self.play(),
            RemoteCommand::Pause => self.player.pause(),
            RemoteCommand::TogglePlayPause => self.player.toggle_play_pause(),
            RemoteCommand::Next => self.player.next(),
            RemoteCommand::Previous => self.player.previous(),
            RemoteCommand::Stop => self.player.stop().map(|()| true),
            RemoteCommand::SeekTo(secs) => self.player.seek(secs),
            RemoteCommand::SeekBy(delta) => {
                let elapsed = self.player.snapshot().state.elapsed;
                self.player.seek(elapsed + delta)
            }
        }
    }

    /// Resume when paused, restart a stopped track, refuse otherwise.
    fn play(&self) -> Result<bool> {
        let snapshot = self.player.snapshot();
        match (snapshot.state.status, snapshot.track) {
            (PlaybackStatus::Paused, _) => self.player.resume(),
            (PlaybackStatus::Stopped, Some(track)) => self.player.play(track).map(|()| true),
            _ => Ok(false),
        }
    }
}
