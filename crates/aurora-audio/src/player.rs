//! The player thread: sole owner of the engine and queue.
//!
//! Every operation from every [`PlayerHandle`] is a command on one channel,
//! so mutations are serialized and notifications leave in mutation order.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use aurora_cache::{ContentStore, Fetcher, PrefetchScheduler};
use aurora_core::history::DEFAULT_HISTORY_LIMIT;
use aurora_core::{
    Direction, Error, Locator, PlayHistory, PlaybackSnapshot, PlaybackStatus, RepeatMode, Result,
    Track,
};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::controller::QueueController;
use crate::effects::{EffectPreset, EffectSettings, EqGains};
use crate::engine::PlaybackEngine;
use crate::event::PlayerEvent;
use crate::loader::{LoadFinished, OnDemandLoader};
use crate::sink::SinkFactory;

/// How often the sink is pumped while playing.
const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Wake-up interval while nothing is playing.
const IDLE_INTERVAL: Duration = Duration::from_millis(50);

type Responder<T> = Sender<Result<T>>;

/// Player tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Initial output volume (0.0 to 1.0).
    pub volume: f32,
    /// Cadence of [`PlayerEvent::Position`] while playing.
    pub position_interval: Duration,
    /// Upcoming queue entries to prefetch after each change (0 disables).
    pub prefetch_ahead: usize,
    pub history_limit: usize,
    /// Effect chain applied from the first track on.
    pub effects: EffectSettings,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: 0.85,
            position_interval: Duration::from_millis(250),
            prefetch_ahead: 2,
            history_limit: DEFAULT_HISTORY_LIMIT,
            effects: EffectSettings::default(),
        }
    }
}

/// Everything the player needs from outside.
pub struct PlayerComponents {
    pub store: Arc<ContentStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub prefetcher: Option<Arc<PrefetchScheduler>>,
    pub sink: SinkFactory,
}

enum Command {
    Play(Track, Responder<()>),
    Pause(Responder<bool>),
    Resume(Responder<bool>),
    TogglePlayPause(Responder<bool>),
    Seek(f64, Responder<bool>),
    Stop(Responder<()>),
    SetQueue(Vec<Track>, usize, Responder<()>),
    AddToQueue(Track, Responder<()>),
    Advance(Direction, Responder<bool>),
    JumpTo(usize, Responder<()>),
    ToggleShuffle(Responder<bool>),
    ToggleRepeat(Responder<RepeatMode>),
    SetVolume(f32, Responder<()>),
    SetEffects(EffectSettings, Responder<()>),
    Effects(Responder<EffectSettings>),
    Queue(Responder<Vec<Track>>),
    History(Responder<PlayHistory>),
    RestoreHistory(PlayHistory, Responder<()>),
    Subscribe(Responder<Receiver<PlayerEvent>>),
    Shutdown(Responder<()>),
}

/// Starts the player thread.
pub struct Player;

impl Player {
    /// Spawn the player thread and wait for its audio output to open.
    pub fn spawn(components: PlayerComponents, config: PlayerConfig) -> Result<PlayerHandle> {
        let (command_tx, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let shared = Arc::new(RwLock::new(PlaybackSnapshot::default()));
        let shared_worker = Arc::clone(&shared);

        let thread = std::thread::Builder::new()
            .name("player".to_string())
            .spawn(move || {
                // Output streams are not Send, so the sink is built here.
                let sink = match (components.sink)() {
                    Ok(sink) => sink,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let (load_tx, load_rx) = unbounded();
                let loader =
                    OnDemandLoader::new(Arc::clone(&components.store), components.fetcher, load_tx);
                let mut engine = PlaybackEngine::new(
                    sink,
                    components.store,
                    loader,
                    config.volume,
                    config.history_limit,
                );
                engine.set_effects(config.effects);

                let published = PlaybackSnapshot {
                    state: engine.state().clone(),
                    ..PlaybackSnapshot::default()
                };
                *shared_worker.write() = published.clone();

                let worker = PlayerWorker {
                    engine,
                    controller: QueueController::new(),
                    prefetcher: components.prefetcher,
                    config,
                    subscribers: Vec::new(),
                    published,
                    shared: shared_worker,
                    last_position: Instant::now(),
                };
                let _ = ready_tx.send(Ok(()));
                worker.run(&command_rx, &load_rx);
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn player thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(PlayerHandle {
                commands: command_tx,
                snapshot: shared,
                thread: Arc::new(Mutex::new(Some(thread))),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(Error::Internal("Player thread exited during startup".to_string())),
        }
    }
}

struct PlayerWorker {
    engine: PlaybackEngine,
    controller: QueueController,
    prefetcher: Option<Arc<PrefetchScheduler>>,
    config: PlayerConfig,
    subscribers: Vec<Sender<PlayerEvent>>,
    /// Last snapshot sent to subscribers.
    published: PlaybackSnapshot,
    shared: Arc<RwLock<PlaybackSnapshot>>,
    last_position: Instant,
}

impl PlayerWorker {
    fn run(mut self, commands: &Receiver<Command>, loads: &Receiver<LoadFinished>) {
        info!("Player started");

        loop {
            let wait = if self.engine.status() == PlaybackStatus::Playing {
                PUMP_INTERVAL
            } else {
                IDLE_INTERVAL
            };

            select! {
                recv(commands) -> msg => match msg {
                    Ok(command) => {
                        if !self.dispatch(command) {
                            break;
                        }
                    }
                    Err(_) => {
                        debug!("All player handles dropped");
                        self.engine.stop();
                        break;
                    }
                },
                recv(loads) -> msg => {
                    if let Ok(done) = msg {
                        if self.engine.complete_load(done) {
                            self.publish();
                        }
                    }
                },
                default(wait) => {}
            }

            self.tick();
        }

        info!("Player stopped");
    }

    /// Handle one command. Returns false when the player should exit.
    fn dispatch(&mut self, command: Command) -> bool {
        let engine = &mut self.engine;
        let controller = &mut self.controller;

        match command {
            Command::Play(track, reply) => {
                let result = controller.play(engine, track);
                self.respond(&reply, result);
            }
            Command::Pause(reply) => {
                let changed = engine.pause();
                self.respond(&reply, Ok(changed));
            }
            Command::Resume(reply) => {
                let changed = engine.resume();
                self.respond(&reply, Ok(changed));
            }
            Command::TogglePlayPause(reply) => {
                let changed = engine.toggle_play_pause();
                self.respond(&reply, Ok(changed));
            }
            Command::Seek(secs, reply) => {
                let applied = engine.seek(secs);
                self.respond(&reply, Ok(applied));
            }
            Command::Stop(reply) => {
                engine.stop();
                self.respond(&reply, Ok(()));
            }
            Command::SetQueue(tracks, start, reply) => {
                let result = controller.set_queue(engine, tracks, start);
                self.respond(&reply, result);
            }
            Command::AddToQueue(track, reply) => {
                controller.add_to_queue(engine, track);
                self.respond(&reply, Ok(()));
            }
            Command::Advance(direction, reply) => {
                let moved = controller.advance(engine, direction);
                self.respond(&reply, Ok(moved));
            }
            Command::JumpTo(index, reply) => {
                let result = controller.jump_to(engine, index);
                self.respond(&reply, result);
            }
            Command::ToggleShuffle(reply) => {
                let shuffle = controller.toggle_shuffle(engine);
                self.respond(&reply, Ok(shuffle));
            }
            Command::ToggleRepeat(reply) => {
                let repeat = controller.toggle_repeat(engine);
                self.respond(&reply, Ok(repeat));
            }
            Command::SetVolume(volume, reply) => {
                engine.set_volume(volume);
                self.respond(&reply, Ok(()));
            }
            Command::SetEffects(settings, reply) => {
                engine.set_effects(settings);
                self.respond(&reply, Ok(()));
            }
            Command::Effects(reply) => {
                let _ = reply.send(Ok(*engine.effects()));
            }
            Command::Queue(reply) => {
                let _ = reply.send(Ok(controller.queue().items().to_vec()));
            }
            Command::History(reply) => {
                let _ = reply.send(Ok(engine.history().clone()));
            }
            Command::RestoreHistory(saved, reply) => {
                engine.restore_history(&saved);
                let _ = reply.send(Ok(()));
            }
            Command::Subscribe(reply) => {
                let (tx, rx) = unbounded();
                let _ = tx.send(PlayerEvent::StateChanged(self.published.clone()));
                self.subscribers.push(tx);
                let _ = reply.send(Ok(rx));
            }
            Command::Shutdown(reply) => {
                info!("Player shutting down");
                engine.stop();
                self.respond(&reply, Ok(()));
                return false;
            }
        }
        true
    }

    /// Publish the outcome of a command before replying, so a caller that
    /// reads the snapshot after the reply sees its own change.
    fn respond<T>(&mut self, reply: &Responder<T>, result: Result<T>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn tick(&mut self) {
        if let Some(finished) = self.engine.tick() {
            self.emit(&PlayerEvent::TrackFinished(finished));
            self.controller.handle_track_end(&mut self.engine);
            self.publish();
        } else if self.engine.status() != self.published.state.status {
            self.publish();
        } else if self.engine.status() == PlaybackStatus::Playing
            && self.last_position.elapsed() >= self.config.position_interval
        {
            self.publish();
            self.last_position = Instant::now();
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let queue = self.controller.queue();
        PlaybackSnapshot {
            state: self.engine.state().clone(),
            track: self.engine.track().cloned(),
            cursor: queue.current_index(),
            queue_len: queue.len(),
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        let previous = std::mem::replace(&mut self.published, snapshot.clone());
        *self.shared.write() = snapshot.clone();

        let track_changed =
            snapshot.track.as_ref().map(|t| &t.id) != previous.track.as_ref().map(|t| &t.id);
        let state_changed = !same_except_elapsed(&snapshot, &previous);
        let moved = (snapshot.state.elapsed - previous.state.elapsed).abs() > f64::EPSILON;

        if track_changed {
            self.emit(&PlayerEvent::TrackChanged(snapshot.track.clone()));
        }
        if state_changed {
            self.emit(&PlayerEvent::StateChanged(snapshot.clone()));
            self.prefetch_upcoming();
        }
        if moved && !track_changed {
            self.emit(&PlayerEvent::Position {
                elapsed: snapshot.state.elapsed,
                duration: snapshot.state.duration,
            });
        }
        for failure in self.engine.take_failures() {
            self.emit(&PlayerEvent::PlaybackFailed {
                track: failure.track,
                message: failure.message,
            });
        }
    }

    fn emit(&mut self, event: &PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Warm the cache for what is coming up next.
    fn prefetch_upcoming(&self) {
        let Some(prefetcher) = &self.prefetcher else {
            return;
        };
        if self.config.prefetch_ahead == 0 {
            return;
        }

        let locators: Vec<Locator> = self
            .controller
            .queue()
            .upcoming(self.config.prefetch_ahead)
            .into_iter()
            .filter_map(|track| track.stream.clone())
            .collect();
        if !locators.is_empty() {
            prefetcher.prefetch(&locators);
        }
    }
}

fn same_except_elapsed(a: &PlaybackSnapshot, b: &PlaybackSnapshot) -> bool {
    let mut a = a.clone();
    a.state.elapsed = b.state.elapsed;
    a == *b
}

/// Cloneable handle for talking to the player thread.
///
/// Every call blocks until the player has applied it and published the
/// resulting state.
#[derive(Clone)]
pub struct PlayerHandle {
    commands: Sender<Command>,
    snapshot: Arc<RwLock<PlaybackSnapshot>>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlayerHandle {
    fn request<T>(&self, build: impl FnOnce(Responder<T>) -> Command) -> Result<T> {
        let (tx, rx) = bounded(1);
        self.commands
            .send(build(tx))
            .map_err(|_| Error::ChannelClosed)?;
        rx.recv().map_err(|_| Error::ChannelClosed)?
    }

    /// Play a track now. If it is in the queue the cursor follows it.
    ///
    /// Fails with [`Error::Playback`] when the track cannot start at all;
    /// later failures of an on-demand fetch arrive as events.
    pub fn play(&self, track: Track) -> Result<()> {
        self.request(|reply| Command::Play(track, reply))
    }

    /// Returns false (a no-op) unless something was playing.
    pub fn pause(&self) -> Result<bool> {
        self.request(Command::Pause)
    }

    /// Returns false (a no-op) unless something was paused.
    pub fn resume(&self) -> Result<bool> {
        self.request(Command::Resume)
    }

    pub fn toggle_play_pause(&self) -> Result<bool> {
        self.request(Command::TogglePlayPause)
    }

    /// Seek within the current track. Returns false when nothing is
    /// playing or paused.
    pub fn seek(&self, secs: f64) -> Result<bool> {
        if !secs.is_finite() {
            return Err(Error::InvalidArgument(format!("invalid seek target {secs}")));
        }
        self.request(|reply| Command::Seek(secs, reply))
    }

    pub fn stop(&self) -> Result<()> {
        self.request(Command::Stop)
    }

    /// Replace the queue and start playing at `start_index`.
    pub fn set_queue(&self, tracks: Vec<Track>, start_index: usize) -> Result<()> {
        self.request(|reply| Command::SetQueue(tracks, start_index, reply))
    }

    pub fn add_to_queue(&self, track: Track) -> Result<()> {
        self.request(|reply| Command::AddToQueue(track, reply))
    }

    /// Returns whether the cursor moved.
    pub fn advance(&self, direction: Direction) -> Result<bool> {
        self.request(|reply| Command::Advance(direction, reply))
    }

    pub fn next(&self) -> Result<bool> {
        self.advance(Direction::Next)
    }

    pub fn previous(&self) -> Result<bool> {
        self.advance(Direction::Previous)
    }

    pub fn jump_to(&self, index: usize) -> Result<()> {
        self.request(|reply| Command::JumpTo(index, reply))
    }

    /// Returns the new shuffle flag.
    pub fn toggle_shuffle(&self) -> Result<bool> {
        self.request(Command::ToggleShuffle)
    }

    /// Returns the new repeat mode.
    pub fn toggle_repeat(&self) -> Result<RepeatMode> {
        self.request(Command::ToggleRepeat)
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(Error::InvalidArgument(format!("invalid volume {volume}")));
        }
        self.request(|reply| Command::SetVolume(volume, reply))
    }

    /// Replace the whole effect chain configuration.
    pub fn set_effects(&self, settings: EffectSettings) -> Result<()> {
        self.request(|reply| Command::SetEffects(settings, reply))
    }

    /// Switch to a preset, keeping the enabled flag.
    ///
    /// `Custom` keeps the current gains and drops reverb and distortion.
    pub fn set_effect(&self, preset: EffectPreset) -> Result<()> {
        let current = self.effects()?;
        let settings = match preset {
            EffectPreset::Custom => EffectSettings::custom(current.gains)?,
            preset => EffectSettings::preset(preset),
        };
        self.set_effects(settings.with_enabled(current.enabled))
    }

    /// Set every equalizer band by hand, in dB.
    pub fn set_custom_eq(&self, gains: EqGains) -> Result<()> {
        let current = self.effects()?;
        self.set_effects(EffectSettings::custom(gains)?.with_enabled(current.enabled))
    }

    /// Turn the effect chain on or off without forgetting its settings.
    pub fn set_effects_enabled(&self, enabled: bool) -> Result<()> {
        let current = self.effects()?;
        self.set_effects(current.with_enabled(enabled))
    }

    pub fn effects(&self) -> Result<EffectSettings> {
        self.request(Command::Effects)
    }

    pub fn queue(&self) -> Result<Vec<Track>> {
        self.request(Command::Queue)
    }

    pub fn history(&self) -> Result<PlayHistory> {
        self.request(Command::History)
    }

    /// Load previously saved history behind anything played so far.
    pub fn restore_history(&self, saved: PlayHistory) -> Result<()> {
        self.request(|reply| Command::RestoreHistory(saved, reply))
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshot.read().clone()
    }

    /// Receive every event from now on, starting with the current state.
    pub fn subscribe(&self) -> Result<Receiver<PlayerEvent>> {
        self.request(Command::Subscribe)
    }

    /// Stop playback and wait for the player thread to exit.
    pub fn shutdown(&self) -> Result<()> {
        match self.request(Command::Shutdown) {
            Ok(()) | Err(Error::ChannelClosed) => {}
            Err(e) => return Err(e),
        }
        if let Some(thread) = self.thread.lock().take() {
            thread
                .join()
                .map_err(|_| Error::Internal("Player thread panicked".to_string()))?;
        }
        Ok(())
    }
}
