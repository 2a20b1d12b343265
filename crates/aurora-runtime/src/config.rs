//! Runtime configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aurora_audio::{EffectSettings, EqGains, PlayerConfig};
use aurora_cache::store::DEFAULT_CEILING_BYTES;
use aurora_cache::{PrefetchConfig, StoreConfig};
use aurora_core::history::DEFAULT_HISTORY_LIMIT;
use aurora_core::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Default cover art ceiling (100 MiB).
pub const DEFAULT_ARTWORK_CEILING_BYTES: u64 = 100 * 1024 * 1024;

/// Default cover art lifetime (7 days).
pub const DEFAULT_ARTWORK_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Settings for a [`crate::Runtime`]. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Where cached audio lives. Defaults to the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub cache_ceiling_bytes: u64,
    pub prefetch_concurrency: usize,
    /// Upcoming queue entries warmed after each track change (0 disables).
    pub prefetch_ahead: usize,
    pub fetch_timeout_secs: u64,
    /// Initial volume, 0.0 to 1.0.
    pub volume: f32,
    pub position_interval_ms: u64,
    pub history_limit: usize,
    /// Effect chain applied at startup.
    pub effects: EffectSettings,
    /// Named equalizer gains saved by the listener.
    pub eq_presets: BTreeMap<String, EqGains>,
    /// Where cover art lives. Defaults to the platform cache directory.
    pub artwork_dir: Option<PathBuf>,
    pub artwork_ceiling_bytes: u64,
    /// Cover art older than this is deleted at startup.
    pub artwork_max_age_secs: u64,
    /// Save listening history on shutdown and restore it on start.
    pub persist_history: bool,
    /// History file. Defaults to `history.json` in the platform data directory.
    pub history_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_ceiling_bytes: DEFAULT_CEILING_BYTES,
            prefetch_concurrency: aurora_cache::prefetch::DEFAULT_PREFETCH_CONCURRENCY,
            prefetch_ahead: 2,
            fetch_timeout_secs: 30,
            volume: 0.85,
            position_interval_ms: 250,
            history_limit: DEFAULT_HISTORY_LIMIT,
            effects: EffectSettings::default(),
            eq_presets: BTreeMap::new(),
            artwork_dir: None,
            artwork_ceiling_bytes: DEFAULT_ARTWORK_CEILING_BYTES,
            artwork_max_age_secs: DEFAULT_ARTWORK_MAX_AGE_SECS,
            persist_history: true,
            history_path: None,
        }
    }
}

impl RuntimeConfig {
    /// Read a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("Invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefetch_concurrency == 0 {
            return Err(Error::Config(
                "prefetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.cache_ceiling_bytes == 0 {
            return Err(Error::Config(
                "cache_ceiling_bytes must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::Config(format!(
                "volume must be between 0.0 and 1.0, got {}",
                self.volume
            )));
        }
        if self.artwork_ceiling_bytes == 0 {
            return Err(Error::Config(
                "artwork_ceiling_bytes must be greater than 0".to_string(),
            ));
        }
        for (name, gains) in &self.eq_presets {
            if name.trim().is_empty() || gains.iter().any(|g| !g.is_finite()) {
                return Err(Error::Config(format!("invalid equalizer preset {name:?}")));
            }
        }
        if self.position_interval_ms == 0 {
            return Err(Error::Config(
                "position_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured cache directory, or `<platform cache dir>/audio`.
    pub fn resolve_cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        Ok(project_dirs()?.cache_dir().join("audio"))
    }

    /// The configured artwork directory, or `<platform cache dir>/artwork`.
    pub fn resolve_artwork_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.artwork_dir {
            return Ok(dir.clone());
        }
        Ok(project_dirs()?.cache_dir().join("artwork"))
    }

    pub fn artwork_store_config(&self) -> Result<StoreConfig> {
        Ok(StoreConfig::new(self.resolve_artwork_dir()?).with_ceiling(self.artwork_ceiling_bytes))
    }

    pub const fn artwork_max_age(&self) -> Duration {
        Duration::from_secs(self.artwork_max_age_secs)
    }

    /// The configured history file, or `<platform data dir>/history.json`.
    pub fn resolve_history_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.history_path {
            return Ok(path.clone());
        }
        Ok(project_dirs()?.data_dir().join("history.json"))
    }

    pub fn store_config(&self) -> Result<StoreConfig> {
        Ok(StoreConfig::new(self.resolve_cache_dir()?).with_ceiling(self.cache_ceiling_bytes))
    }

    pub const fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig {
            concurrency: self.prefetch_concurrency,
        }
    }

    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub const fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            volume: self.volume,
            position_interval: Duration::from_millis(self.position_interval_ms),
            prefetch_ahead: self.prefetch_ahead,
            history_limit: self.history_limit,
            effects: self.effects,
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "aurora", "Aurora")
        .ok_or_else(|| Error::Config("Failed to determine platform directories".to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache_ceiling_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.prefetch_concurrency, 2);
        assert_eq!(config.player_config().position_interval, Duration::from_millis(250));
        assert_eq!(config.artwork_max_age(), Duration::from_secs(604_800));
        assert_eq!(config.artwork_ceiling_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"volume": 0.5, "prefetch_ahead": 0}"#).unwrap();
        assert!((config.volume - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.prefetch_ahead, 0);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_workers = RuntimeConfig {
            prefetch_concurrency: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(zero_workers.validate(), Err(Error::Config(_))));

        let loud = RuntimeConfig {
            volume: 1.5,
            ..RuntimeConfig::default()
        };
        assert!(matches!(loud.validate(), Err(Error::Config(_))));

        let no_room = RuntimeConfig {
            cache_ceiling_bytes: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(no_room.validate(), Err(Error::Config(_))));

        let no_artwork_room = RuntimeConfig {
            artwork_ceiling_bytes: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(no_artwork_room.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aurora.json");
        let config = RuntimeConfig {
            cache_dir: Some(dir.path().join("cache")),
            history_limit: 50,
            ..RuntimeConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.resolve_cache_dir().unwrap(), dir.path().join("cache"));
    }

    #[test]
    fn test_effects_and_presets_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aurora.json");
        let mut config = RuntimeConfig {
            effects: EffectSettings::preset(aurora_audio::EffectPreset::Pop),
            ..RuntimeConfig::default()
        };
        config.eq_presets.insert(
            "late night".to_string(),
            [-3.0, -2.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, -1.0, -2.0],
        );
        config.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.eq_presets, config.eq_presets);
        assert_eq!(loaded.player_config().effects, config.effects);
    }

    #[test]
    fn test_unnamed_preset_rejected() {
        let mut config = RuntimeConfig::default();
        config
            .eq_presets
            .insert("  ".to_string(), [0.0; aurora_audio::EQ_BANDS]);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_history_path_override() {
        let config = RuntimeConfig {
            history_path: Some(PathBuf::from("/var/lib/aurora/plays.json")),
            ..RuntimeConfig::default()
        };
        assert_eq!(
            config.resolve_history_path().unwrap(),
            PathBuf::from("/var/lib/aurora/plays.json")
        );
        assert!(RuntimeConfig::default().persist_history);
    }

    #[test]
    fn test_load_rejects_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aurora.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(RuntimeConfig::load(&path), Err(Error::Config(_))));
        assert!(matches!(
            RuntimeConfig::load(&dir.path().join("missing.json")),
            Err(Error::Config(_))
        ));
    }
}
