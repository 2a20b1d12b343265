//! Bridge republishing and remote command outcomes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use aurora_audio::testing::{MemoryFetcher, SinkScript};
use aurora_audio::{Player, PlayerComponents, PlayerConfig, PlayerHandle};
use aurora_cache::{ContentStore, StoreConfig};
use aurora_core::{PlaybackSnapshot, PlaybackStatus, Result, Track};
use aurora_transport::{CommandStatus, NowPlaying, RemoteCommand, RemoteSurface, TransportBridge};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;

struct Harness {
    _dir: tempfile::TempDir,
    script: SinkScript,
    player: PlayerHandle,
    bridge: TransportBridge,
}

impl Harness {
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ContentStore::open(StoreConfig::new(dir.path())).unwrap());
        let script = SinkScript::new();
        let player = Player::spawn(
            PlayerComponents {
                store,
                fetcher: Arc::new(MemoryFetcher::new()),
                prefetcher: None,
                sink: script.factory(),
            },
            PlayerConfig {
                position_interval: Duration::from_millis(20),
                ..PlayerConfig::default()
            },
        )
        .unwrap();
        let bridge = TransportBridge::start(player.clone()).unwrap();

        Self {
            _dir: dir,
            script,
            player,
            bridge,
        }
    }

    fn play_album(&self, count: usize) {
        self.player.set_queue(album(count), 0).unwrap();
        wait_until(|| self.bridge.snapshot().state.status == PlaybackStatus::Playing);
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.bridge.shutdown();
        let _ = self.player.shutdown();
    }
}

/// Surface that keeps everything it was shown.
#[derive(Clone, Default)]
struct RecordingSurface(Arc<Mutex<Vec<Option<NowPlaying>>>>);

impl RecordingSurface {
    fn last(&self) -> Option<Option<NowPlaying>> {
        self.0.lock().last().cloned()
    }

    fn len(&self) -> usize {
        self.0.lock().len()
    }
}

impl RemoteSurface for RecordingSurface {
    fn publish(&mut self, now_playing: Option<&NowPlaying>) -> Result<()> {
        self.0.lock().push(now_playing.cloned());
        Ok(())
    }
}

fn album(count: usize) -> Vec<Track> {
    (0..count)
        .map(|i| {
            Track::new(format!("t{i}"), format!("Track {i}"), "Quiet Hours")
                .with_duration(180.0)
                .with_stream(format!("https://cdn.example.com/t{i}.ogg"))
        })
        .collect()
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for_snapshot(
    rx: &Receiver<PlaybackSnapshot>,
    mut matches: impl FnMut(&PlaybackSnapshot) -> bool,
) -> PlaybackSnapshot {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let snapshot = rx
            .recv_timeout(remaining)
            .expect("expected snapshot never arrived");
        if matches(&snapshot) {
            return snapshot;
        }
    }
}

#[test]
fn observer_gets_current_state_first() {
    let h = Harness::start();
    let rx = h.bridge.observe();
    let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(first.state.status, PlaybackStatus::Idle);
    assert!(first.track.is_none());
}

#[test]
fn observer_follows_playback() {
    let h = Harness::start();
    let rx = h.bridge.observe();

    h.player.set_queue(album(2), 1).unwrap();
    let playing = wait_for_snapshot(&rx, |s| s.state.status == PlaybackStatus::Playing);
    assert_eq!(playing.track.unwrap().id, "t1");
    assert_eq!(playing.cursor, Some(1));

    h.player.pause().unwrap();
    wait_for_snapshot(&rx, |s| s.state.status == PlaybackStatus::Paused);
}

#[test]
fn position_updates_reach_observers() {
    let h = Harness::start();
    h.play_album(1);
    let rx = h.bridge.observe();

    h.script.advance(42.0);
    let snapshot = wait_for_snapshot(&rx, |s| s.state.elapsed >= 42.0);
    assert_eq!(snapshot.state.status, PlaybackStatus::Playing);
    assert!((h.bridge.snapshot().state.elapsed - 42.0).abs() < 1e-6);
}

#[test]
fn surface_is_seeded_then_cleared_on_stop() {
    let h = Harness::start();
    h.play_album(1);

    let surface = RecordingSurface::default();
    h.bridge.attach_surface(Box::new(surface.clone())).unwrap();
    assert_eq!(surface.len(), 1);
    let shown = surface.last().unwrap().unwrap();
    assert_eq!(shown.title, "Track 0");
    assert_eq!(shown.artist, "Quiet Hours");
    assert_eq!(shown.duration, Some(180.0));
    assert_eq!(shown.status, PlaybackStatus::Playing);

    h.player.stop().unwrap();
    wait_until(|| matches!(surface.last(), Some(None)));
}

#[test]
fn remote_pause_twice_reports_failure() {
    let h = Harness::start();
    h.play_album(1);

    assert_eq!(h.bridge.handle(RemoteCommand::Pause), CommandStatus::Success);
    assert_eq!(h.bridge.handle(RemoteCommand::Pause), CommandStatus::Failed);
    assert_eq!(h.player.snapshot().state.status, PlaybackStatus::Paused);

    assert!(h.bridge.handle(RemoteCommand::Play).is_success());
    assert_eq!(h.player.snapshot().state.status, PlaybackStatus::Playing);
}

#[test]
fn remote_play_without_track_fails() {
    let h = Harness::start();
    assert_eq!(h.bridge.handle(RemoteCommand::Play), CommandStatus::Failed);
    assert_eq!(h.player.snapshot().state.status, PlaybackStatus::Idle);
}

#[test]
fn remote_play_restarts_finished_track() {
    let h = Harness::start();
    h.play_album(1);

    h.script.finish_track();
    wait_until(|| h.player.snapshot().state.status == PlaybackStatus::Stopped);

    assert!(h.bridge.handle(RemoteCommand::Play).is_success());
    let snapshot = h.player.snapshot();
    assert_eq!(snapshot.state.status, PlaybackStatus::Playing);
    assert_eq!(snapshot.track.unwrap().id, "t0");
}

#[test]
fn remote_next_past_end_fails() {
    let h = Harness::start();
    h.play_album(2);

    assert!(h.bridge.handle(RemoteCommand::Next).is_success());
    assert_eq!(h.player.snapshot().cursor, Some(1));
    assert_eq!(h.bridge.handle(RemoteCommand::Next), CommandStatus::Failed);
    assert_eq!(h.player.snapshot().cursor, Some(1));
}

#[test]
fn remote_seek_by_is_relative() {
    let h = Harness::start();
    h.play_album(1);

    assert!(h.bridge.handle(RemoteCommand::SeekTo(30.0)).is_success());
    assert!(h.bridge.handle(RemoteCommand::SeekBy(15.0)).is_success());
    assert!((h.script.position() - 45.0).abs() < 1e-6);

    assert!(h.bridge.handle(RemoteCommand::SeekBy(-100.0)).is_success());
    assert!(h.script.position().abs() < 1e-6);
}

#[test]
fn remote_stop_always_succeeds() {
    let h = Harness::start();
    assert!(h.bridge.handle(RemoteCommand::Stop).is_success());
    h.play_album(1);
    assert!(h.bridge.handle(RemoteCommand::Stop).is_success());
    assert_eq!(h.player.snapshot().state.status, PlaybackStatus::Idle);
}

#[test]
fn shutdown_is_idempotent() {
    let h = Harness::start();
    h.bridge.shutdown();
    h.bridge.shutdown();
    assert_eq!(h.bridge.handle(RemoteCommand::Stop), CommandStatus::Success);
}
