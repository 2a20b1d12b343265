//! End-to-end wiring with in-memory network and audio doubles.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use aurora_audio::testing::{MemoryFetcher, SinkScript};
use aurora_core::{Error, Locator, MediaSource, PlaybackStatus, Result, Track, TrackQuery};
use aurora_runtime::{Runtime, RuntimeConfig};
use aurora_transport::RemoteCommand;

/// Catalog that lists tracks without stream locators, like a media server
/// that hands out signed URLs on request.
struct LazySource {
    ids: Vec<&'static str>,
}

impl MediaSource for LazySource {
    fn fetch_tracks(&self, query: &TrackQuery) -> Result<Vec<Track>> {
        match query {
            TrackQuery::Library(_) => Ok(self
                .ids
                .iter()
                .map(|id| Track::new(*id, format!("Song {id}"), "Lazy"))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn resolve_stream_locator(&self, track_id: &str) -> Result<Locator> {
        if track_id == "broken" {
            return Err(Error::Network("signing service down".to_string()));
        }
        Ok(Locator::new(format!("https://media.example.com/{track_id}.mp3")))
    }
}

struct Harness {
    dir: tempfile::TempDir,
    script: SinkScript,
    fetcher: Arc<MemoryFetcher>,
    runtime: Runtime,
}

impl Harness {
    fn start() -> Self {
        Self::in_dir(tempfile::tempdir().unwrap())
    }

    fn in_dir(dir: tempfile::TempDir) -> Self {
        Self::configured(dir, |_| {})
    }

    fn configured(dir: tempfile::TempDir, tweak: impl FnOnce(&mut RuntimeConfig)) -> Self {
        let mut config = RuntimeConfig {
            cache_dir: Some(dir.path().join("cache")),
            artwork_dir: Some(dir.path().join("artwork")),
            history_path: Some(dir.path().join("state").join("history.json")),
            position_interval_ms: 20,
            ..RuntimeConfig::default()
        };
        tweak(&mut config);
        let script = SinkScript::new();
        let fetcher = Arc::new(MemoryFetcher::new());
        let runtime =
            Runtime::with_components(config, fetcher.clone(), script.factory()).unwrap();

        Self {
            dir,
            script,
            fetcher,
            runtime,
        }
    }

    /// Shut down and start a fresh runtime over the same directories.
    fn restart(self) -> Self {
        self.runtime.shutdown().unwrap();
        let Self { dir, runtime, .. } = self;
        drop(runtime);
        Self::in_dir(dir)
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn library(ids: &[&'static str]) -> (LazySource, TrackQuery) {
    (
        LazySource { ids: ids.to_vec() },
        TrackQuery::Library("lib".to_string()),
    )
}

#[test]
fn play_from_source_resolves_locators() {
    let h = Harness::start();
    let (source, query) = library(&["a", "b"]);

    let queued = h.runtime.play_from_source(&source, &query, 0).unwrap();
    assert!(queued.iter().all(|t| t.stream.is_some()));

    let player = h.runtime.player();
    wait_until(|| player.snapshot().state.status == PlaybackStatus::Playing);
    assert_eq!(player.snapshot().track.unwrap().id, "a");
    assert_eq!(
        h.script.opened_contents()[0],
        b"https://media.example.com/a.mp3".to_vec()
    );
}

#[test]
fn unresolvable_track_fails_when_reached() {
    let h = Harness::start();
    let (source, query) = library(&["broken", "fine"]);

    let queued = h.runtime.play_from_source(&source, &query, 0).unwrap();
    assert!(queued[0].stream.is_none());

    let player = h.runtime.player();
    let snapshot = player.snapshot();
    assert_eq!(snapshot.state.status, PlaybackStatus::Stopped);
    assert!(snapshot.state.error.is_some());

    assert!(player.next().unwrap());
    wait_until(|| player.snapshot().state.status == PlaybackStatus::Playing);
}

#[test]
fn upcoming_tracks_are_prefetched() {
    let h = Harness::start();
    let (source, query) = library(&["one", "two", "three", "four"]);
    h.runtime.play_from_source(&source, &query, 0).unwrap();

    let store = h.runtime.store();
    wait_until(|| {
        store.has(&Locator::new("https://media.example.com/two.mp3"))
            && store.has(&Locator::new("https://media.example.com/three.mp3"))
    });
    assert!(!store.has(&Locator::new("https://media.example.com/four.mp3")));
}

#[test]
fn clear_cache_empties_store() {
    let h = Harness::start();
    let (source, query) = library(&["solo"]);
    h.runtime.play_from_source(&source, &query, 0).unwrap();

    let player = h.runtime.player();
    wait_until(|| player.snapshot().state.status == PlaybackStatus::Playing);
    assert_eq!(h.runtime.cache_stats().unwrap().entry_count, 1);

    h.runtime.clear_cache().unwrap();
    let stats = h.runtime.cache_stats().unwrap();
    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.total_bytes, 0);
    assert!(h.dir.path().join("cache").exists());
}

#[test]
fn remote_commands_reach_the_player() {
    let h = Harness::start();
    let (source, query) = library(&["x", "y"]);
    h.runtime.play_from_source(&source, &query, 0).unwrap();

    let player = h.runtime.player();
    wait_until(|| player.snapshot().state.status == PlaybackStatus::Playing);

    let bridge = h.runtime.bridge();
    assert!(bridge.handle(RemoteCommand::Pause).is_success());
    assert!(!h.script.is_playing());
    assert!(bridge.handle(RemoteCommand::Next).is_success());
    wait_until(|| player.snapshot().track.is_some_and(|t| t.id == "y"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig {
        cache_dir: Some(dir.path().to_path_buf()),
        volume: 2.0,
        ..RuntimeConfig::default()
    };
    let err = Runtime::with_components(
        config,
        Arc::new(MemoryFetcher::new()),
        SinkScript::new().factory(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn shutdown_twice_is_fine() {
    let h = Harness::start();
    h.runtime.shutdown().unwrap();
    h.runtime.shutdown().unwrap();
    assert!(matches!(h.runtime.player().pause(), Err(Error::ChannelClosed)));
    assert!(h.fetcher.calls().is_empty());
}

#[test]
fn history_survives_restart() {
    let h = Harness::start();
    let (source, query) = library(&["first"]);
    h.runtime.play_from_source(&source, &query, 0).unwrap();

    let player = h.runtime.player();
    wait_until(|| player.snapshot().state.status == PlaybackStatus::Playing);
    h.script.finish_track();
    wait_until(|| player.history().unwrap().len() == 1);

    let h = h.restart();
    assert!(h.dir.path().join("state").join("history.json").is_file());

    let history = h.runtime.player().history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history.records()[0].track_id, "first");
    assert!(history.records()[0].completed);
}

#[test]
fn corrupt_history_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("state")).unwrap();
    std::fs::write(dir.path().join("state").join("history.json"), "[{ nope").unwrap();

    let h = Harness::in_dir(dir);
    assert!(h.runtime.player().history().unwrap().is_empty());

    // The next shutdown replaces the unreadable file.
    let h = h.restart();
    assert!(h.runtime.player().history().unwrap().is_empty());
    let saved = std::fs::read_to_string(h.dir.path().join("state").join("history.json")).unwrap();
    assert_eq!(saved, "[]");
}

#[test]
fn cover_art_is_fetched_once_into_its_own_store() {
    let h = Harness::start();
    let track = Track::new("c", "Covered", "Artist")
        .with_stream("https://media.example.com/c.mp3")
        .with_cover("https://img.example.com/c.jpg");

    let path = h.runtime.cover_art(&track).unwrap().unwrap();
    assert!(path.starts_with(h.dir.path().join("artwork")));
    assert_eq!(std::fs::read(&path).unwrap(), b"https://img.example.com/c.jpg");
    assert_eq!(h.runtime.cover_art(&track).unwrap(), Some(path));
    assert_eq!(h.fetcher.calls().len(), 1);

    assert_eq!(h.runtime.artwork_stats().unwrap().entry_count, 1);
    assert_eq!(h.runtime.cache_stats().unwrap().entry_count, 0);
    assert_eq!(
        h.runtime
            .cover_art(&Track::new("bare", "No Cover", "Artist"))
            .unwrap(),
        None
    );
}

#[test]
fn stale_cover_art_expires() {
    let h = Harness::configured(tempfile::tempdir().unwrap(), |config| {
        config.artwork_max_age_secs = 1;
    });
    let track = Track::new("c", "Covered", "Artist").with_cover("https://img.example.com/c.jpg");
    h.runtime.cover_art(&track).unwrap();

    assert_eq!(h.runtime.expire_artwork().unwrap().evicted, 0);
    std::thread::sleep(Duration::from_millis(1100));
    assert_eq!(h.runtime.expire_artwork().unwrap().evicted, 1);
    assert_eq!(h.runtime.artwork_stats().unwrap().entry_count, 0);
}

#[test]
fn saved_eq_presets_persist_through_settings() {
    let h = Harness::start();
    let gains = [2.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 2.0];

    h.runtime.save_eq_preset("  loudness ", gains).unwrap();
    assert_eq!(h.runtime.eq_preset_names(), vec!["loudness".to_string()]);
    assert!(h.runtime.save_eq_preset("", gains).is_err());
    assert!(h.runtime.apply_eq_preset("missing").is_err());

    h.runtime.apply_eq_preset("loudness").unwrap();
    assert_eq!(h.script.effects().gains, gains);

    let path = h.dir.path().join("aurora.json");
    h.runtime.settings().unwrap().save(&path).unwrap();
    let saved = RuntimeConfig::load(&path).unwrap();
    assert_eq!(saved.eq_presets.get("loudness"), Some(&gains));
    assert_eq!(saved.effects.gains, gains);

    h.runtime.shutdown().unwrap();
    let Harness { dir, runtime, .. } = h;
    drop(runtime);
    let h = Harness::configured(dir, |config| {
        config.eq_presets = saved.eq_presets.clone();
        config.effects = saved.effects;
    });
    assert_eq!(h.runtime.eq_preset("loudness"), Some(gains));
    assert_eq!(h.script.effects().gains, gains);

    assert!(h.runtime.delete_eq_preset("loudness"));
    assert!(!h.runtime.delete_eq_preset("loudness"));
    assert!(h.runtime.settings().unwrap().eq_presets.is_empty());
}
