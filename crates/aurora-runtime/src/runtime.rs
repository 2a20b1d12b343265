//! Explicit wiring of the playback core.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use aurora_audio::effects::validate_gains;
use aurora_audio::{CpalSink, EqGains, Player, PlayerComponents, PlayerHandle, SinkFactory};
use aurora_cache::{
    CacheStats, CancelToken, ContentStore, EvictionReport, Fetcher, HttpFetcher,
    PrefetchScheduler,
};
use aurora_core::{Error, MediaSource, PlayHistory, Result, Track, TrackQuery};
use aurora_transport::TransportBridge;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;

/// Every long-lived component, constructed once and handed out by
/// reference.
pub struct Runtime {
    config: RuntimeConfig,
    store: Arc<ContentStore>,
    artwork: ContentStore,
    fetcher: Arc<dyn Fetcher>,
    prefetcher: Arc<PrefetchScheduler>,
    player: PlayerHandle,
    bridge: TransportBridge,
    eq_presets: RwLock<BTreeMap<String, EqGains>>,
}

impl Runtime {
    /// Start with HTTP fetching and the default audio device.
    pub fn start(config: RuntimeConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.fetch_timeout()));
        let sink = CpalSink::factory(config.volume);
        Self::with_components(config, fetcher, sink)
    }

    /// Start with a caller-supplied network seam and audio output.
    pub fn with_components(
        config: RuntimeConfig,
        fetcher: Arc<dyn Fetcher>,
        sink: SinkFactory,
    ) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(ContentStore::open(config.store_config()?)?);
        let artwork = ContentStore::open(config.artwork_store_config()?)?;
        if let Err(e) = artwork.expire_older_than(config.artwork_max_age()) {
            warn!("Artwork expiry failed: {e}");
        }

        let prefetcher = Arc::new(PrefetchScheduler::new(
            Arc::clone(&store),
            Arc::clone(&fetcher),
            config.prefetch_config(),
        )?);

        let player = Player::spawn(
            PlayerComponents {
                store: Arc::clone(&store),
                fetcher: Arc::clone(&fetcher),
                prefetcher: Some(Arc::clone(&prefetcher)),
                sink,
            },
            config.player_config(),
        )?;

        if config.persist_history {
            if let Err(e) = restore_history(&config, &player) {
                warn!("Starting with empty history: {e}");
            }
        }

        let bridge = match TransportBridge::start(player.clone()) {
            Ok(bridge) => bridge,
            Err(e) => {
                let _ = player.shutdown();
                return Err(e);
            }
        };

        info!("Aurora v{} started", env!("CARGO_PKG_VERSION"));
        Ok(Self {
            eq_presets: RwLock::new(config.eq_presets.clone()),
            config,
            store,
            artwork,
            fetcher,
            prefetcher,
            player,
            bridge,
        })
    }

    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The startup config updated with the current effects and saved
    /// presets, ready to be written back with [`RuntimeConfig::save`].
    pub fn settings(&self) -> Result<RuntimeConfig> {
        Ok(RuntimeConfig {
            effects: self.player.effects()?,
            eq_presets: self.eq_presets.read().clone(),
            ..self.config.clone()
        })
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Cover art cache, separate from the audio cache.
    pub const fn artwork(&self) -> &ContentStore {
        &self.artwork
    }

    pub fn prefetcher(&self) -> &PrefetchScheduler {
        &self.prefetcher
    }

    pub const fn player(&self) -> &PlayerHandle {
        &self.player
    }

    pub const fn bridge(&self) -> &TransportBridge {
        &self.bridge
    }

    /// Queue the tracks `source` returns for `query` and start at `start`.
    ///
    /// Tracks the source listed without a stream locator get one resolved
    /// individually; a track that still has none stays in the queue and
    /// fails when it is reached.
    pub fn play_from_source(
        &self,
        source: &dyn MediaSource,
        query: &TrackQuery,
        start: usize,
    ) -> Result<Vec<Track>> {
        let mut tracks = source.fetch_tracks(query)?;
        debug!("Source returned {} tracks for {query:?}", tracks.len());

        for track in tracks.iter_mut().filter(|track| track.stream.is_none()) {
            match source.resolve_stream_locator(&track.id) {
                Ok(locator) => track.stream = Some(locator),
                Err(e) => warn!("No stream for {}: {e}", track.title),
            }
        }

        self.player.set_queue(tracks.clone(), start)?;
        Ok(tracks)
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        self.store.stats()
    }

    /// Drop every cached blob. Playback of an already open file continues.
    pub fn clear_cache(&self) -> Result<()> {
        self.store.clear()
    }

    /// Save equalizer gains under `name`, replacing any preset of that name.
    pub fn save_eq_preset(&self, name: &str, gains: EqGains) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "preset name must not be empty".to_string(),
            ));
        }
        let gains = validate_gains(gains)?;
        self.eq_presets.write().insert(name.to_string(), gains);
        debug!("Saved equalizer preset {name:?}");
        Ok(())
    }

    pub fn eq_preset(&self, name: &str) -> Option<EqGains> {
        self.eq_presets.read().get(name).copied()
    }

    /// Names of every saved preset, sorted.
    pub fn eq_preset_names(&self) -> Vec<String> {
        self.eq_presets.read().keys().cloned().collect()
    }

    /// Returns whether a preset of that name existed.
    pub fn delete_eq_preset(&self, name: &str) -> bool {
        self.eq_presets.write().remove(name).is_some()
    }

    /// Load a saved preset into the player's equalizer.
    pub fn apply_eq_preset(&self, name: &str) -> Result<()> {
        let gains = self.eq_preset(name).ok_or_else(|| {
            Error::InvalidArgument(format!("no equalizer preset named {name:?}"))
        })?;
        self.player.set_custom_eq(gains)
    }

    /// Local copy of a track's cover art, fetched on first use.
    ///
    /// Returns `None` for tracks without a cover locator.
    pub fn cover_art(&self, track: &Track) -> Result<Option<PathBuf>> {
        let Some(locator) = &track.cover else {
            return Ok(None);
        };
        if let Some(path) = self.artwork.get(locator) {
            return Ok(Some(path));
        }

        debug!("Fetching cover art {locator}");
        let bytes = self.fetcher.fetch(locator, &CancelToken::new())?;
        self.artwork.store(locator, &bytes).map(Some)
    }

    pub fn artwork_stats(&self) -> Result<CacheStats> {
        self.artwork.stats()
    }

    /// Delete cover art older than the configured lifetime.
    pub fn expire_artwork(&self) -> Result<EvictionReport> {
        self.artwork.expire_older_than(self.config.artwork_max_age())
    }

    /// Write the player's history to the configured history file.
    pub fn save_history(&self) -> Result<()> {
        let history = self.player.history()?;
        let path = self.config.resolve_history_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create {}: {e}", parent.display())))?;
        }

        let temp = path.with_extension("json.tmp");
        fs::write(&temp, history.export_json()?)
            .and_then(|()| fs::rename(&temp, &path))
            .map_err(|e| Error::Storage(format!("Failed to write {}: {e}", path.display())))?;
        debug!("Saved {} history records to {}", history.len(), path.display());
        Ok(())
    }

    /// Stop playback and every background thread. Safe to call twice.
    ///
    /// History is saved first while the player can still report it.
    pub fn shutdown(&self) -> Result<()> {
        self.bridge.shutdown();
        if self.config.persist_history {
            match self.save_history() {
                Ok(()) | Err(Error::ChannelClosed) => {}
                Err(e) => warn!("History not saved: {e}"),
            }
        }
        self.player.shutdown()?;
        self.prefetcher.shutdown();
        info!("Aurora stopped");
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Shutdown failed: {e}");
        }
    }
}

/// Hand a saved history file to the player. A missing file is a first run.
fn restore_history(config: &RuntimeConfig, player: &PlayerHandle) -> Result<()> {
    let path = config.resolve_history_path()?;
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(Error::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            )))
        }
    };

    let mut saved = PlayHistory::new(config.history_limit);
    saved.import_json(&text)?;
    info!("Restoring {} history records", saved.len());
    player.restore_history(saved)
}
