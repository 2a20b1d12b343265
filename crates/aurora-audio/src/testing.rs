//! Test doubles for driving the player without audio hardware or a network.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aurora_cache::{CancelToken, Fetcher};
use aurora_core::{Error, Locator, Result};
use bytes::Bytes;
use parking_lot::Mutex;

use crate::effects::EffectSettings;
use crate::sink::{AudioSink, SinkFactory, SinkStatus};

#[derive(Debug)]
struct ScriptState {
    duration: Option<f64>,
    fail_opens: usize,
    finish_requested: bool,
    playing: bool,
    position: f64,
    volume: f32,
    effects: EffectSettings,
    opened: Vec<PathBuf>,
    contents: Vec<Vec<u8>>,
}

/// Remote control for a [`ScriptedSink`].
///
/// The sink "plays" without advancing time on its own. Tests move the
/// clock with [`SinkScript::advance`] and end a track with
/// [`SinkScript::finish_track`].
#[derive(Debug, Clone)]
pub struct SinkScript(Arc<Mutex<ScriptState>>);

impl Default for SinkScript {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(ScriptState {
            duration: Some(180.0),
            fail_opens: 0,
            finish_requested: false,
            playing: false,
            position: 0.0,
            volume: 0.0,
            effects: EffectSettings::default(),
            opened: Vec::new(),
            contents: Vec::new(),
        })))
    }
}

impl SinkScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration reported for every opened file.
    #[must_use]
    pub fn with_duration(self, duration: Option<f64>) -> Self {
        self.0.lock().duration = duration;
        self
    }

    /// Make the next `count` opens fail as undecodable.
    pub fn fail_next_opens(&self, count: usize) {
        self.0.lock().fail_opens = count;
    }

    /// The next pump reports the open file as finished.
    pub fn finish_track(&self) {
        self.0.lock().finish_requested = true;
    }

    /// Move the playback clock forward while playing.
    pub fn advance(&self, secs: f64) {
        let mut state = self.0.lock();
        if state.playing {
            state.position += secs;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.0.lock().playing
    }

    pub fn position(&self) -> f64 {
        self.0.lock().position
    }

    pub fn volume(&self) -> f32 {
        self.0.lock().volume
    }

    /// Effect settings most recently handed to the sink.
    pub fn effects(&self) -> EffectSettings {
        self.0.lock().effects
    }

    /// Paths opened so far, oldest first.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.0.lock().opened.clone()
    }

    /// Bytes of each opened file, oldest first.
    pub fn opened_contents(&self) -> Vec<Vec<u8>> {
        self.0.lock().contents.clone()
    }

    pub fn sink(&self) -> ScriptedSink {
        ScriptedSink {
            script: self.clone(),
        }
    }

    pub fn factory(&self) -> SinkFactory {
        let script = self.clone();
        Box::new(move || Ok(Box::new(script.sink()) as Box<dyn AudioSink>))
    }
}

/// In-memory [`AudioSink`] controlled by a [`SinkScript`].
#[derive(Debug)]
pub struct ScriptedSink {
    script: SinkScript,
}

impl AudioSink for ScriptedSink {
    fn open(&mut self, path: &Path, _hint: Option<&str>) -> Result<Option<f64>> {
        let mut state = self.script.0.lock();
        state.playing = false;
        state.position = 0.0;
        state.finish_requested = false;

        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(Error::AudioDecode(format!(
                "Failed to read format of {}",
                path.display()
            )));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| Error::AudioDecode(format!("Failed to open {}: {e}", path.display())))?;
        state.opened.push(path.to_path_buf());
        state.contents.push(bytes);
        Ok(state.duration)
    }

    fn start(&mut self) -> Result<()> {
        self.script.0.lock().playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.script.0.lock().playing = false;
    }

    fn seek(&mut self, secs: f64) -> Result<()> {
        let mut state = self.script.0.lock();
        state.position = secs;
        state.finish_requested = false;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.script.0.lock();
        state.playing = false;
        state.position = 0.0;
    }

    fn set_volume(&mut self, volume: f32) {
        self.script.0.lock().volume = volume;
    }

    fn set_effects(&mut self, settings: &EffectSettings) {
        self.script.0.lock().effects = *settings;
    }

    fn position(&self) -> f64 {
        self.script.0.lock().position
    }

    fn pump(&mut self) -> Result<SinkStatus> {
        let mut state = self.script.0.lock();
        if state.finish_requested {
            state.finish_requested = false;
            if let Some(duration) = state.duration {
                state.position = duration;
            }
            return Ok(SinkStatus::Finished);
        }
        Ok(SinkStatus::Running)
    }
}

#[derive(Debug, Default)]
struct FetcherState {
    blobs: HashMap<Locator, Bytes>,
    failing: HashSet<Locator>,
    held: HashSet<Locator>,
    calls: Vec<Locator>,
}

/// [`Fetcher`] serving bytes from memory.
///
/// Unknown locators are served their own text as content, so tests can tell
/// which file a sink opened. Held locators block until released or cancelled.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    state: Mutex<FetcherState>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: impl Into<Locator>, bytes: impl Into<Bytes>) {
        self.state.lock().blobs.insert(locator.into(), bytes.into());
    }

    /// Fail every fetch of `locator` with a network error.
    pub fn fail(&self, locator: impl Into<Locator>) {
        self.state.lock().failing.insert(locator.into());
    }

    /// Block fetches of `locator` until [`MemoryFetcher::release`].
    pub fn hold(&self, locator: impl Into<Locator>) {
        self.state.lock().held.insert(locator.into());
    }

    pub fn release(&self, locator: &Locator) {
        self.state.lock().held.remove(locator);
    }

    /// Every fetch started so far, oldest first.
    pub fn calls(&self) -> Vec<Locator> {
        self.state.lock().calls.clone()
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, locator: &Locator, cancel: &CancelToken) -> Result<Bytes> {
        self.state.lock().calls.push(locator.clone());

        while self.state.lock().held.contains(locator) {
            cancel.check()?;
            std::thread::sleep(Duration::from_millis(2));
        }
        cancel.check()?;

        let state = self.state.lock();
        if state.failing.contains(locator) {
            return Err(Error::Network(format!("{locator} is unreachable")));
        }
        Ok(state
            .blobs
            .get(locator)
            .cloned()
            .unwrap_or_else(|| Bytes::from(locator.as_str().as_bytes().to_vec())))
    }
}
