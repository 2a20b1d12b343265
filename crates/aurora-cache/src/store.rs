//! Content-addressed disk cache for audio blobs.
//!
//! One file per locator, named from the SHA-256 of the locator. There is no
//! manifest: presence on disk is what "cached" means.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use aurora_core::{Error, Locator, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Default cache ceiling (1 GiB).
pub const DEFAULT_CEILING_BYTES: u64 = 1024 * 1024 * 1024;

/// Directory, inside the cache directory, holding in-progress writes.
const PARTIAL_DIR: &str = ".partial";

/// Content store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Cache directory, exclusively owned by the store.
    pub dir: PathBuf,
    /// Maximum aggregate size of cached blobs.
    pub ceiling_bytes: u64,
}

impl StoreConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ceiling_bytes: DEFAULT_CEILING_BYTES,
        }
    }

    #[must_use]
    pub const fn with_ceiling(mut self, ceiling_bytes: u64) -> Self {
        self.ceiling_bytes = ceiling_bytes;
        self
    }
}

/// A cached blob as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// File name, derived from the locator by [`ContentStore::key_for`].
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub ceiling_bytes: u64,
}

impl CacheStats {
    /// Get the total size in megabytes.
    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Fraction of the ceiling in use.
    pub fn usage(&self) -> f64 {
        if self.ceiling_bytes == 0 {
            return 0.0;
        }
        self.total_bytes as f64 / self.ceiling_bytes as f64
    }
}

/// Outcome of an eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub evicted: usize,
    pub freed_bytes: u64,
    /// Aggregate size after the sweep.
    pub remaining_bytes: u64,
}

type PinTable = Arc<Mutex<HashMap<PathBuf, usize>>>;

/// Keeps one cache entry out of eviction sweeps while alive.
///
/// Taken before a file is handed to a reader that has not opened it yet.
#[derive(Debug)]
#[must_use = "the entry is only protected while the pin is held"]
pub struct EntryPin {
    path: PathBuf,
    pins: PinTable,
}

impl EntryPin {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EntryPin {
    fn drop(&mut self) {
        let mut pins = self.pins.lock();
        if let Some(count) = pins.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&self.path);
            }
        }
    }
}

/// Disk cache keyed by locator.
pub struct ContentStore {
    dir: PathBuf,
    partial_dir: PathBuf,
    ceiling: u64,
    /// Serializes eviction sweeps and clears.
    sweep: Mutex<()>,
    /// Entries sweeps must skip, with their holder counts.
    pins: PinTable,
}

impl ContentStore {
    /// Open (creating if needed) the cache directory.
    ///
    /// Partial files left behind by an interrupted process are discarded.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if config.ceiling_bytes == 0 {
            return Err(Error::InvalidArgument(
                "cache ceiling must be greater than zero".to_string(),
            ));
        }

        let partial_dir = config.dir.join(PARTIAL_DIR);
        if partial_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&partial_dir) {
                warn!("Failed to discard partial cache writes: {e}");
            }
        }
        fs::create_dir_all(&partial_dir)
            .map_err(|e| Error::Storage(format!("Failed to create cache directory: {e}")))?;

        info!(
            "Content store opened at {} (ceiling {} bytes)",
            config.dir.display(),
            config.ceiling_bytes
        );

        Ok(Self {
            dir: config.dir,
            partial_dir,
            ceiling: config.ceiling_bytes,
            sweep: Mutex::new(()),
            pins: PinTable::default(),
        })
    }

    /// Get the cache directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the configured ceiling in bytes.
    pub const fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Deterministic file name for a locator.
    ///
    /// The locator's extension is kept so decoders get a format hint.
    pub fn key_for(locator: &Locator) -> String {
        let mut hasher = Sha256::new();
        hasher.update(locator.as_str().as_bytes());
        let digest = hex::encode(hasher.finalize());
        match locator.extension() {
            Some(ext) => format!("{digest}.{ext}"),
            None => digest,
        }
    }

    /// Path a locator is (or would be) cached at.
    pub fn path_for(&self, locator: &Locator) -> PathBuf {
        self.dir.join(Self::key_for(locator))
    }

    /// Check whether a locator is cached.
    pub fn has(&self, locator: &Locator) -> bool {
        self.path_for(locator).is_file()
    }

    /// Local path of a cached locator. Never touches the network.
    pub fn get(&self, locator: &Locator) -> Option<PathBuf> {
        let path = self.path_for(locator);
        path.is_file().then_some(path)
    }

    /// Protect a locator's entry from eviction until the pin is dropped.
    ///
    /// The locator need not be cached yet; a pin taken before a fetch also
    /// covers the file the fetch stores.
    pub fn pin(&self, locator: &Locator) -> EntryPin {
        let path = self.path_for(locator);
        *self.pins.lock().entry(path.clone()).or_insert(0) += 1;
        EntryPin {
            path,
            pins: Arc::clone(&self.pins),
        }
    }

    /// Check whether a locator's entry is currently pinned.
    pub fn is_pinned(&self, locator: &Locator) -> bool {
        self.pins.lock().contains_key(&self.path_for(locator))
    }

    /// Store a blob for a locator, replacing any previous entry atomically.
    ///
    /// The blob is written under the partial directory and renamed over the
    /// final path, so readers never see a half-written file. An eviction
    /// sweep runs before returning.
    pub fn store(&self, locator: &Locator, bytes: &[u8]) -> Result<PathBuf> {
        let size = bytes.len() as u64;
        if size > self.ceiling {
            return Err(Error::Storage(format!(
                "{size} byte blob for {locator} exceeds cache ceiling of {} bytes",
                self.ceiling
            )));
        }

        let path = self.path_for(locator);
        let mut temp = NamedTempFile::new_in(&self.partial_dir)
            .map_err(|e| storage_error("create temporary file", &e))?;
        temp.write_all(bytes)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| storage_error("write cache file", &e))?;
        temp.persist(&path)
            .map_err(|e| storage_error("move cache file into place", &e.error))?;

        debug!("Cached {} bytes for {locator} at {}", size, path.display());

        if let Err(e) = self.sweep(Some(&path)) {
            warn!("Eviction sweep after store failed: {e}");
        }

        Ok(path)
    }

    /// Remove a single entry. Returns whether anything was removed.
    pub fn remove(&self, locator: &Locator) -> Result<bool> {
        match fs::remove_file(self.path_for(locator)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error("remove cache file", &e)),
        }
    }

    /// All cached entries, oldest first.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let read_dir =
            fs::read_dir(&self.dir).map_err(|e| storage_error("list cache directory", &e))?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| storage_error("list cache directory", &e))?;
            let key = dir_entry.file_name().to_string_lossy().into_owned();
            if key.starts_with('.') {
                continue;
            }

            // Entries can vanish between listing and stat under a concurrent sweep.
            let Ok(metadata) = dir_entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            entries.push(CacheEntry {
                key,
                path: dir_entry.path(),
                size_bytes: metadata.len(),
                created_at: DateTime::<Utc>::from(created),
            });
        }

        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(entries)
    }

    /// Aggregate size of all cached blobs.
    pub fn total_size(&self) -> Result<u64> {
        Ok(self.entries()?.iter().map(|e| e.size_bytes).sum())
    }

    /// Get cache statistics.
    pub fn stats(&self) -> Result<CacheStats> {
        let entries = self.entries()?;
        Ok(CacheStats {
            entry_count: entries.len(),
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            ceiling_bytes: self.ceiling,
        })
    }

    /// Delete oldest entries until the aggregate size fits under the ceiling.
    pub fn evict_if_over_capacity(&self) -> Result<EvictionReport> {
        self.sweep(None)
    }

    fn sweep(&self, keep: Option<&Path>) -> Result<EvictionReport> {
        let _guard = self.sweep.lock();

        let entries = self.entries()?;
        let mut total: u64 = entries.iter().map(|e| e.size_bytes).sum();
        let mut report = EvictionReport::default();
        let pinned = self.pins.lock().clone();

        for entry in &entries {
            if total <= self.ceiling {
                break;
            }
            if keep == Some(entry.path.as_path()) || pinned.contains_key(&entry.path) {
                continue;
            }

            match fs::remove_file(&entry.path) {
                Ok(()) => {
                    debug!("Evicted {} ({} bytes)", entry.key, entry.size_bytes);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to evict {}: {e}", entry.path.display());
                    continue;
                }
            }
            total = total.saturating_sub(entry.size_bytes);
            report.evicted += 1;
            report.freed_bytes += entry.size_bytes;
        }

        report.remaining_bytes = total;
        if report.evicted > 0 {
            info!(
                "Eviction sweep removed {} entries ({} bytes), {} bytes remain",
                report.evicted, report.freed_bytes, report.remaining_bytes
            );
        }
        Ok(report)
    }

    /// Delete entries created more than `max_age` ago. Pinned entries stay.
    pub fn expire_older_than(&self, max_age: Duration) -> Result<EvictionReport> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| Error::InvalidArgument(format!("expiry age out of range: {e}")))?;
        self.expire_created_before(Utc::now() - max_age)
    }

    /// Delete entries created before `cutoff`. Pinned entries stay.
    pub fn expire_created_before(&self, cutoff: DateTime<Utc>) -> Result<EvictionReport> {
        let _guard = self.sweep.lock();

        let entries = self.entries()?;
        let pinned = self.pins.lock().clone();
        let mut report = EvictionReport::default();
        let mut total: u64 = entries.iter().map(|e| e.size_bytes).sum();

        for entry in entries
            .iter()
            .filter(|e| e.created_at < cutoff && !pinned.contains_key(&e.path))
        {
            match fs::remove_file(&entry.path) {
                Ok(()) => debug!("Expired {} (created {})", entry.key, entry.created_at),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to expire {}: {e}", entry.path.display());
                    continue;
                }
            }
            total = total.saturating_sub(entry.size_bytes);
            report.evicted += 1;
            report.freed_bytes += entry.size_bytes;
        }

        report.remaining_bytes = total;
        if report.evicted > 0 {
            info!(
                "Expired {} entries ({} bytes) from {}",
                report.evicted,
                report.freed_bytes,
                self.dir.display()
            );
        }
        Ok(report)
    }

    /// Clear all cached data.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.sweep.lock();

        let mut failures = 0usize;
        for entry in self.entries()? {
            match fs::remove_file(&entry.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {e}", entry.path.display());
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            return Err(Error::Storage(format!(
                "{failures} cache files could not be removed"
            )));
        }

        info!("Cache cleared");
        Ok(())
    }
}

fn storage_error(action: &str, err: &io::Error) -> Error {
    Error::Storage(format!("Failed to {action}: {err}"))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use std::thread::sleep;

    fn open(dir: &Path, ceiling: u64) -> ContentStore {
        ContentStore::open(StoreConfig::new(dir).with_ceiling(ceiling)).unwrap()
    }

    #[test]
    fn test_key_is_stable_and_keeps_extension() {
        let a = ContentStore::key_for(&Locator::new("https://example.com/a.flac"));
        let b = ContentStore::key_for(&Locator::new("https://example.com/b.flac"));
        assert_ne!(a, b);
        assert!(a.ends_with(".flac"));
        assert_eq!(a.len(), 64 + ".flac".len()); // SHA256 hex
        assert_eq!(
            a,
            ContentStore::key_for(&Locator::new("https://example.com/a.flac"))
        );
    }

    #[test]
    fn test_store_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let locator = Locator::new("https://example.com/song.mp3");

        assert!(!store.has(&locator));
        assert!(store.get(&locator).is_none());

        let path = store.store(&locator, b"ID3 audio bytes").unwrap();
        assert!(store.has(&locator));
        assert_eq!(store.get(&locator), Some(path.clone()));
        assert_eq!(fs::read(path).unwrap(), b"ID3 audio bytes");
    }

    #[test]
    fn test_store_replaces_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let locator = Locator::new("https://example.com/song.mp3");

        store.store(&locator, b"first").unwrap();
        let path = store.store(&locator, b"second version").unwrap();

        assert_eq!(fs::read(path).unwrap(), b"second version");
        assert_eq!(store.entries().unwrap().len(), 1);
        // Nothing left behind in the partial directory.
        assert_eq!(fs::read_dir(dir.path().join(PARTIAL_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_blob_over_ceiling_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 4);
        let err = store.store(&Locator::new("big.mp3"), b"12345").unwrap_err();
        assert!(err.is_storage());
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_eviction_removes_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 25);
        let first = Locator::new("https://example.com/1.mp3");
        let second = Locator::new("https://example.com/2.mp3");
        let third = Locator::new("https://example.com/3.mp3");

        store.store(&first, &[1u8; 10]).unwrap();
        sleep(Duration::from_millis(30));
        store.store(&second, &[2u8; 10]).unwrap();
        sleep(Duration::from_millis(30));
        store.store(&third, &[3u8; 10]).unwrap();

        assert!(!store.has(&first));
        assert!(store.has(&second));
        assert!(store.has(&third));
        assert_eq!(store.total_size().unwrap(), 20);
    }

    #[test]
    fn test_pinned_entry_survives_sweep_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 25);
        let loading = Locator::new("https://example.com/loading.mp3");
        let other = Locator::new("https://example.com/other.mp3");

        let pin = store.pin(&loading);
        assert!(store.is_pinned(&loading));
        store.store(&loading, &[1u8; 15]).unwrap();
        sleep(Duration::from_millis(30));
        store.store(&other, &[2u8; 15]).unwrap();

        // Over the ceiling, but the only older entry is pinned.
        assert!(store.has(&loading));
        assert!(store.has(&other));

        drop(pin);
        assert!(!store.is_pinned(&loading));
        let report = store.evict_if_over_capacity().unwrap();
        assert_eq!(report.evicted, 1);
        assert!(!store.has(&loading));
        assert!(store.has(&other));
    }

    #[test]
    fn test_pins_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let locator = Locator::new("https://example.com/a.mp3");

        let first = store.pin(&locator);
        let second = store.pin(&locator);
        assert_eq!(first.path(), store.path_for(&locator).as_path());
        drop(first);
        assert!(store.is_pinned(&locator));
        drop(second);
        assert!(!store.is_pinned(&locator));
    }

    #[test]
    fn test_expiry_removes_only_older_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let stale = Locator::new("https://example.com/cover-1.jpg");
        let pinned = Locator::new("https://example.com/cover-2.jpg");
        let fresh = Locator::new("https://example.com/cover-3.jpg");

        store.store(&stale, b"old jpeg").unwrap();
        store.store(&pinned, b"old but in use").unwrap();
        sleep(Duration::from_millis(30));
        let cutoff = Utc::now();
        sleep(Duration::from_millis(30));
        store.store(&fresh, b"new jpeg").unwrap();

        let _pin = store.pin(&pinned);
        let report = store.expire_created_before(cutoff).unwrap();
        assert_eq!(report.evicted, 1);
        assert_eq!(report.freed_bytes, 8);
        assert!(!store.has(&stale));
        assert!(store.has(&pinned));
        assert!(store.has(&fresh));
        assert_eq!(report.remaining_bytes, store.total_size().unwrap());
    }

    #[test]
    fn test_expire_older_than_keeps_recent_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let locator = Locator::new("https://example.com/cover.png");
        store.store(&locator, b"png").unwrap();

        let week = Duration::from_secs(7 * 24 * 60 * 60);
        assert_eq!(store.expire_older_than(week).unwrap().evicted, 0);
        assert!(store.has(&locator));

        sleep(Duration::from_millis(30));
        assert_eq!(store.expire_older_than(Duration::ZERO).unwrap().evicted, 1);
        assert!(!store.has(&locator));
    }

    #[test]
    fn test_evict_if_over_capacity_noop_under_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 100);
        store.store(&Locator::new("a.ogg"), &[0u8; 40]).unwrap();
        let report = store.evict_if_over_capacity().unwrap();
        assert_eq!(report.evicted, 0);
        assert_eq!(report.remaining_bytes, 40);
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path(), 1024);
        let locators: Vec<_> = (0..3)
            .map(|i| Locator::new(format!("https://example.com/{i}.mp3")))
            .collect();
        for locator in &locators {
            store.store(locator, b"data").unwrap();
        }

        store.clear().unwrap();
        assert!(locators.iter().all(|l| !store.has(l)));
        assert_eq!(store.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_open_discards_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(PARTIAL_DIR)).unwrap();
        fs::write(dir.path().join(PARTIAL_DIR).join("stale.tmp"), b"junk").unwrap();

        let store = open(dir.path(), 1024);
        assert_eq!(fs::read_dir(dir.path().join(PARTIAL_DIR)).unwrap().count(), 0);
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ContentStore::open(StoreConfig::new(dir.path()).with_ceiling(0)).is_err());
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(24))]

        #[test]
        fn total_never_exceeds_ceiling(writes in proptest::collection::vec((0u8..8, 1usize..60), 1..30)) {
            let dir = tempfile::tempdir().unwrap();
            let store = open(dir.path(), 100);

            for (id, size) in writes {
                let locator = Locator::new(format!("https://example.com/{id}.mp3"));
                let bytes = vec![id; size];
                let path = store.store(&locator, &bytes).unwrap();

                proptest::prop_assert!(store.total_size().unwrap() <= 100);
                proptest::prop_assert_eq!(fs::read(path).unwrap(), bytes);
            }
        }
    }
}
