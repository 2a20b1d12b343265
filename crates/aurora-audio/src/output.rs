//! Audio output using cpal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use aurora_core::{Error, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use crate::buffer::SharedSampleQueue;

/// State shared between the owner thread and the output callback.
#[derive(Debug)]
pub struct OutputControl {
    volume: Mutex<f32>,
    playing: AtomicBool,
    /// Samples handed to the device since the last reset.
    consumed: AtomicU64,
}

impl OutputControl {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: Mutex::new(volume.clamp(0.0, 1.0)),
            playing: AtomicBool::new(false),
            consumed: AtomicU64::new(0),
        }
    }

    pub fn set_volume(&self, volume: f32) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Acquire)
    }

    pub fn reset_consumed(&self) {
        self.consumed.store(0, Ordering::Release);
    }

    fn add_consumed(&self, samples: usize) {
        self.consumed.fetch_add(samples as u64, Ordering::AcqRel);
    }
}

/// The open output stream. Not `Send`: it lives on the thread that built it.
pub struct AudioOutput {
    _stream: Stream,
    sample_rate: u32,
    channels: u16,
    device_name: String,
}

impl AudioOutput {
    /// Open the default output device.
    pub fn open_default(queue: SharedSampleQueue, control: Arc<OutputControl>) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;
        Self::with_device(&device, queue, control)
    }

    pub fn with_device(
        device: &Device,
        queue: SharedSampleQueue,
        control: Arc<OutputControl>,
    ) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;
        debug!("Supported output config: {supported:?}");

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(device, &config, queue, control)?,
            SampleFormat::I16 => build_stream::<i16>(device, &config, queue, control)?,
            SampleFormat::U16 => build_stream::<u16>(device, &config, queue, control)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {other:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        info!(
            "Audio output on {device_name}: {} Hz, {} channels",
            config.sample_rate.0, config.channels
        );

        Ok(Self {
            _stream: stream,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            device_name,
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    queue: SharedSampleQueue,
    control: Arc<OutputControl>,
) -> Result<Stream> {
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if !control.is_playing() {
                    data.fill(T::from_sample(0.0f32));
                    return;
                }

                scratch.resize(data.len(), 0.0);
                let read = queue.pop_into(&mut scratch);
                control.add_consumed(read);

                let volume = control.volume();
                for (i, sample) in data.iter_mut().enumerate() {
                    let value = if i < read {
                        let s = scratch[i] * volume;
                        // Soft clipping near full scale.
                        if s.abs() > 0.9 {
                            s.tanh()
                        } else {
                            s
                        }
                    } else {
                        0.0
                    };
                    *sample = T::from_sample(value);
                }

                if read > 0 && read < data.len() {
                    trace!("Output underrun: needed {}, got {read}", data.len());
                }
            },
            |err| error!("Audio stream error: {err}"),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))
}
