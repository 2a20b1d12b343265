//! Playback state machine.
//!
//! `Idle -> Loading -> Playing <-> Paused -> Stopped`, with `stop` returning
//! to `Idle` from anywhere. Every failure lands in `Stopped` with the error
//! recorded on the state.

use std::path::Path;
use std::sync::Arc;

use aurora_cache::{CancelToken, ContentStore};
use aurora_core::{Error, PlayHistory, PlaybackState, PlaybackStatus, RepeatMode, Result, Track};
use tracing::{debug, info, warn};

use crate::effects::EffectSettings;
use crate::loader::{LoadFinished, OnDemandLoader};
use crate::sink::{AudioSink, SinkStatus};

/// A load the engine is waiting on.
struct PendingLoad {
    ticket: u64,
    token: CancelToken,
}

/// A playback failure waiting to be reported to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackFailure {
    pub track: Option<Track>,
    pub message: String,
}

/// Owns the single audio output and the playback state.
pub struct PlaybackEngine {
    sink: Box<dyn AudioSink>,
    store: Arc<ContentStore>,
    loader: OnDemandLoader,
    state: PlaybackState,
    track: Option<Track>,
    next_ticket: u64,
    pending: Option<PendingLoad>,
    history: PlayHistory,
    effects: EffectSettings,
    failures: Vec<PlaybackFailure>,
}

impl PlaybackEngine {
    pub fn new(
        sink: Box<dyn AudioSink>,
        store: Arc<ContentStore>,
        loader: OnDemandLoader,
        volume: f32,
        history_limit: usize,
    ) -> Self {
        let mut sink = sink;
        let volume = volume.clamp(0.0, 1.0);
        sink.set_volume(volume);
        Self {
            sink,
            store,
            loader,
            state: PlaybackState {
                volume,
                ..PlaybackState::default()
            },
            track: None,
            next_ticket: 0,
            pending: None,
            history: PlayHistory::new(history_limit),
            effects: EffectSettings::default(),
            failures: Vec::new(),
        }
    }

    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub const fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    /// Track currently associated with the engine.
    pub const fn track(&self) -> Option<&Track> {
        self.track.as_ref()
    }

    pub const fn history(&self) -> &PlayHistory {
        &self.history
    }

    /// Replace the history with saved records, keeping the engine's limit.
    ///
    /// Plays recorded since startup stay ahead of the restored ones.
    pub fn restore_history(&mut self, saved: &PlayHistory) {
        let mut restored = PlayHistory::new(self.history.limit());
        for record in saved.records().iter().rev() {
            restored.push(record.clone());
        }
        for record in self.history.records().iter().rev() {
            restored.push(record.clone());
        }
        debug!("Restored {} history records", saved.len());
        self.history = restored;
    }

    /// Whether a track is loading, playing or paused.
    pub const fn is_engaged(&self) -> bool {
        matches!(
            self.state.status,
            PlaybackStatus::Loading | PlaybackStatus::Playing | PlaybackStatus::Paused
        )
    }

    pub const fn effects(&self) -> &EffectSettings {
        &self.effects
    }

    /// Hand new effect settings to the sink. They also apply to later tracks.
    pub fn set_effects(&mut self, settings: EffectSettings) {
        debug!("Effects set to {:?} (enabled: {})", settings.preset, settings.enabled);
        self.effects = settings;
        self.sink.set_effects(&settings);
    }

    /// Failures raised since the last call.
    pub fn take_failures(&mut self) -> Vec<PlaybackFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Mirror the queue's modes onto the published state.
    pub const fn set_modes(&mut self, repeat: RepeatMode, shuffle: bool) {
        self.state.repeat = repeat;
        self.state.shuffle = shuffle;
    }

    /// Start playing `track`, superseding whatever was loaded.
    ///
    /// A cache hit opens the file immediately. A miss moves to `Loading` and
    /// starts an on-demand fetch whose completion arrives through
    /// [`PlaybackEngine::complete_load`]. Errors returned here have already
    /// been recorded on the state.
    pub fn play(&mut self, track: Track) -> Result<()> {
        self.supersede();

        info!("Playing {} - {}", track.artist, track.title);
        self.state.error = None;
        self.state.elapsed = 0.0;
        self.state.duration = track.duration;
        let locator = track.stream.clone();
        self.track = Some(track);

        let Some(locator) = locator else {
            return Err(self.fail(Error::Playback("track has no stream locator".to_string())));
        };

        self.state.status = PlaybackStatus::Loading;

        let pin = self.store.pin(&locator);
        if let Some(path) = self.store.get(&locator) {
            debug!("Cache hit for {locator}");
            let opened = self.open(&path, locator.extension().as_deref());
            drop(pin);
            return opened;
        }
        drop(pin);

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        match self.loader.spawn(ticket, locator) {
            Ok(token) => {
                self.pending = Some(PendingLoad { ticket, token });
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Apply the result of an on-demand load. Results for loads that have
    /// since been superseded are discarded. Returns whether it was applied.
    pub fn complete_load(&mut self, done: LoadFinished) -> bool {
        let current = self.pending.as_ref().map(|p| p.ticket);
        if current != Some(done.ticket) {
            debug!("Discarding stale load of {} (ticket {})", done.locator, done.ticket);
            return false;
        }
        self.pending = None;

        match done.result {
            Ok(path) => {
                // Already recorded on the state when it fails.
                let _ = self.open(&path, done.locator.extension().as_deref());
            }
            Err(e) => {
                self.fail(e);
            }
        }
        drop(done.pin);
        true
    }

    fn open(&mut self, path: &Path, hint: Option<&str>) -> Result<()> {
        let opened = self.sink.open(path, hint).and_then(|duration| {
            self.sink.set_volume(self.state.volume);
            self.sink.start()?;
            Ok(duration)
        });

        match opened {
            Ok(duration) => {
                if duration.is_some() {
                    self.state.duration = duration;
                }
                self.state.elapsed = 0.0;
                self.state.status = PlaybackStatus::Playing;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Record a failure: release the output and land in `Stopped`.
    fn fail(&mut self, err: Error) -> Error {
        let err = err.into_playback();
        let message = err.to_string();
        warn!("{message}");

        self.cancel_pending();
        self.sink.close();
        self.state.status = PlaybackStatus::Stopped;
        self.state.elapsed = 0.0;
        self.state.error = Some(message.clone());
        self.failures.push(PlaybackFailure {
            track: self.track.clone(),
            message,
        });
        err
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("Cancelling on-demand load (ticket {})", pending.ticket);
            pending.token.cancel();
        }
    }

    /// Tear down the current track before another takes its place.
    fn supersede(&mut self) {
        if let Some(track) = &self.track {
            if self.state.status.is_active() && self.state.elapsed > 0.0 {
                self.history.record(track.id.clone(), self.state.elapsed, false);
            }
        }
        self.cancel_pending();
        self.sink.close();
    }

    /// Pause if playing. Returns whether anything changed.
    pub fn pause(&mut self) -> bool {
        if self.state.status != PlaybackStatus::Playing {
            debug!("Ignoring pause in {:?}", self.state.status);
            return false;
        }
        self.state.elapsed = self.sink.position();
        self.sink.pause();
        self.state.status = PlaybackStatus::Paused;
        true
    }

    /// Resume if paused. Returns whether anything changed.
    pub fn resume(&mut self) -> bool {
        if self.state.status != PlaybackStatus::Paused {
            debug!("Ignoring resume in {:?}", self.state.status);
            return false;
        }
        if let Err(e) = self.sink.start() {
            self.fail(e);
            return false;
        }
        self.state.status = PlaybackStatus::Playing;
        true
    }

    pub fn toggle_play_pause(&mut self) -> bool {
        match self.state.status {
            PlaybackStatus::Playing => self.pause(),
            PlaybackStatus::Paused => self.resume(),
            _ => false,
        }
    }

    /// Seek within the loaded track, clamped to `[0, duration]`.
    pub fn seek(&mut self, secs: f64) -> bool {
        if !self.state.status.is_active() {
            debug!("Ignoring seek in {:?}", self.state.status);
            return false;
        }

        let target = match self.state.duration {
            Some(duration) => secs.clamp(0.0, duration),
            None => secs.max(0.0),
        };
        if let Err(e) = self.sink.seek(target) {
            warn!("Seek to {target:.2}s failed: {e}");
            return false;
        }
        self.state.elapsed = target;
        true
    }

    /// Release the output and forget the track. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.track.is_some() {
            info!("Playback stopped");
        }
        self.supersede();
        self.track = None;
        self.state.status = PlaybackStatus::Idle;
        self.state.elapsed = 0.0;
        self.state.duration = None;
        self.state.error = None;
    }

    /// End of queue: keep the track but release the output.
    pub fn finish(&mut self) {
        self.cancel_pending();
        self.sink.close();
        self.state.status = PlaybackStatus::Stopped;
        self.state.elapsed = 0.0;
    }

    /// Play the current track again from the start.
    pub fn replay(&mut self) {
        let restarted = self.sink.seek(0.0).and_then(|()| self.sink.start());
        match restarted {
            Ok(()) => {
                self.state.elapsed = 0.0;
                self.state.status = PlaybackStatus::Playing;
            }
            Err(e) => {
                debug!("Seek-to-start failed ({e}), reloading");
                if let Some(track) = self.track.clone() {
                    let _ = self.play(track);
                }
            }
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.state.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.state.volume);
    }

    /// Drive the output. Returns the track if it just played to the end.
    pub fn tick(&mut self) -> Option<Track> {
        if self.state.status != PlaybackStatus::Playing {
            return None;
        }

        match self.sink.pump() {
            Ok(SinkStatus::Running) => {
                let position = self.sink.position();
                self.state.elapsed = match self.state.duration {
                    Some(duration) => position.min(duration),
                    None => position,
                };
                None
            }
            Ok(SinkStatus::Finished) => {
                let track = self.track.clone()?;
                let listened = self.state.duration.unwrap_or(self.state.elapsed);
                self.state.elapsed = listened;
                // Whatever comes next must not count this as a partial play.
                self.state.status = PlaybackStatus::Stopped;
                self.history.record(track.id.clone(), listened, true);
                debug!("Finished {}", track.title);
                Some(track)
            }
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }
}
