//! The audio output seam owned by the playback engine.

use std::path::Path;
use std::sync::Arc;

use aurora_core::Result;
use tracing::debug;

use crate::buffer::{SampleQueue, SharedSampleQueue};
use crate::decode::AudioDecoder;
use crate::effects::{EffectChain, EffectSettings};
use crate::output::{AudioOutput, OutputControl};
use crate::resample::{remix, Resampler};

/// Seconds of audio kept decoded ahead of the output callback.
const READ_AHEAD_SECS: f64 = 0.5;

/// Progress reported by [`AudioSink::pump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Running,
    /// Every sample of the open file has been played.
    Finished,
}

/// An audio output that plays one local file at a time.
///
/// Implementations are driven from the player thread only, so they need not
/// be `Send`.
pub trait AudioSink {
    /// Open a file, replacing whatever was open. Returns the decoded
    /// duration when the container declares one. Playback starts paused.
    fn open(&mut self, path: &Path, hint: Option<&str>) -> Result<Option<f64>>;

    fn start(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Restart decoding from `secs`.
    fn seek(&mut self, secs: f64) -> Result<()>;

    /// Release the open file.
    fn close(&mut self);

    fn set_volume(&mut self, volume: f32);

    /// Replace the effect settings for the open file and every later one.
    fn set_effects(&mut self, settings: &EffectSettings);

    /// Seconds played of the open file.
    fn position(&self) -> f64;

    /// Do a slice of decode work and report whether the file has ended.
    fn pump(&mut self) -> Result<SinkStatus>;
}

/// Builds the sink on the player thread.
pub type SinkFactory = Box<dyn FnOnce() -> Result<Box<dyn AudioSink>> + Send>;

struct OpenFile {
    decoder: AudioDecoder,
    effects: EffectChain,
    resampler: Resampler,
    /// Decoder reached end of stream.
    drained: bool,
    /// Position the consumed-sample counter is relative to.
    base_secs: f64,
}

/// Sink decoding with symphonia and playing through the default cpal device.
pub struct CpalSink {
    output: AudioOutput,
    queue: SharedSampleQueue,
    control: Arc<OutputControl>,
    effects: EffectSettings,
    file: Option<OpenFile>,
}

impl CpalSink {
    pub fn new(volume: f32) -> Result<Self> {
        let queue = SampleQueue::shared();
        let control = Arc::new(OutputControl::new(volume));
        let output = AudioOutput::open_default(Arc::clone(&queue), Arc::clone(&control))?;
        Ok(Self {
            output,
            queue,
            control,
            effects: EffectSettings::default(),
            file: None,
        })
    }

    /// Factory that opens the default device on the player thread.
    pub fn factory(volume: f32) -> SinkFactory {
        Box::new(move || Ok(Box::new(Self::new(volume)?) as Box<dyn AudioSink>))
    }

    fn device_channels(&self) -> usize {
        usize::from(self.output.channels())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn read_ahead_samples(&self) -> usize {
        (f64::from(self.output.sample_rate()) * READ_AHEAD_SECS) as usize * self.device_channels()
    }

    fn fill(&mut self) -> Result<()> {
        let target = self.read_ahead_samples();
        let channels = self.device_channels();
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        while !file.drained && self.queue.len() < target {
            let source_channels = file.decoder.channels();
            let converted = match file.decoder.decode_next()? {
                Some(samples) => {
                    let mut mixed = remix(samples, source_channels, channels);
                    file.effects.process(&mut mixed);
                    file.resampler.process(&mixed)?
                }
                None => {
                    file.drained = true;
                    file.resampler.flush()?
                }
            };
            self.queue.push(&converted);
        }
        Ok(())
    }
}

impl AudioSink for CpalSink {
    fn open(&mut self, path: &Path, hint: Option<&str>) -> Result<Option<f64>> {
        self.close();

        let decoder = AudioDecoder::open(path, hint)?;
        let resampler = Resampler::new(
            decoder.sample_rate(),
            self.output.sample_rate(),
            self.device_channels(),
        )?;
        let effects = EffectChain::new(decoder.sample_rate(), self.device_channels(), self.effects)?;
        let duration = decoder.duration();

        self.file = Some(OpenFile {
            decoder,
            effects,
            resampler,
            drained: false,
            base_secs: 0.0,
        });
        self.fill()?;
        debug!("Sink opened {} on {}", path.display(), self.output.device_name());
        Ok(duration)
    }

    fn start(&mut self) -> Result<()> {
        self.control.set_playing(self.file.is_some());
        Ok(())
    }

    fn pause(&mut self) {
        self.control.set_playing(false);
    }

    fn seek(&mut self, secs: f64) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.decoder.seek(secs)?;
        file.effects.reset();
        file.resampler.reset();
        file.drained = false;
        file.base_secs = secs;
        self.queue.clear();
        self.control.reset_consumed();
        self.fill()
    }

    fn close(&mut self) {
        self.control.set_playing(false);
        self.file = None;
        self.queue.clear();
        self.control.reset_consumed();
    }

    fn set_volume(&mut self, volume: f32) {
        self.control.set_volume(volume);
    }

    fn set_effects(&mut self, settings: &EffectSettings) {
        self.effects = *settings;
        if let Some(file) = self.file.as_mut() {
            file.effects.configure(*settings);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn position(&self) -> f64 {
        let Some(file) = self.file.as_ref() else {
            return 0.0;
        };
        let per_sec = f64::from(self.output.sample_rate()) * self.device_channels() as f64;
        file.base_secs + self.control.consumed() as f64 / per_sec
    }

    fn pump(&mut self) -> Result<SinkStatus> {
        self.fill()?;
        match &self.file {
            Some(file) if file.drained && self.queue.is_empty() => Ok(SinkStatus::Finished),
            Some(_) => Ok(SinkStatus::Running),
            None => Ok(SinkStatus::Finished),
        }
    }
}
