//! Sample-rate and channel conversion to the output device format.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use aurora_core::{Error, Result};
use rubato::{FftFixedIn, Resampler as RubatoResampler};
use tracing::debug;

/// Frames per resampler chunk.
const CHUNK_FRAMES: usize = 1024;

/// Converts interleaved audio from the decoder rate to the device rate.
pub struct Resampler {
    inner: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Deinterleaved frames waiting for a full chunk.
    pending: Vec<Vec<f32>>,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(Error::AudioOutput("Cannot resample zero channels".to_string()));
        }

        let inner = if input_rate == output_rate {
            None
        } else {
            let resampler = FftFixedIn::new(
                input_rate as usize,
                output_rate as usize,
                CHUNK_FRAMES,
                2,
                channels,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {e}")))?;
            debug!("Resampler created: {input_rate}Hz -> {output_rate}Hz, {channels} channels");
            Some(resampler)
        };

        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
            pending: vec![Vec::new(); channels],
        })
    }

    pub const fn needs_resampling(&self) -> bool {
        self.inner.is_some()
    }

    pub const fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub const fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Feed interleaved samples and collect whatever full chunks produce.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(input.to_vec());
        };

        for frame in input.chunks_exact(self.channels) {
            for (plane, sample) in self.pending.iter_mut().zip(frame) {
                plane.push(*sample);
            }
        }

        let mut output = Vec::new();
        while self.pending[0].len() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|plane| plane.drain(..CHUNK_FRAMES).collect())
                .collect();
            let resampled = inner
                .process(&chunk, None)
                .map_err(|e| Error::AudioOutput(format!("Resample failed: {e}")))?;
            interleave_into(&resampled, usize::MAX, &mut output);
        }
        Ok(output)
    }

    /// Pad and convert the final partial chunk at end of stream.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        let remaining = self.pending[0].len();
        if remaining == 0 {
            return Ok(Vec::new());
        }

        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|plane| {
                let mut data = std::mem::take(plane);
                data.resize(CHUNK_FRAMES, 0.0);
                data
            })
            .collect();
        let resampled = inner
            .process(&chunk, None)
            .map_err(|e| Error::AudioOutput(format!("Resample failed: {e}")))?;

        // Keep only the part that corresponds to real input.
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let keep = (remaining as f64 * f64::from(self.output_rate) / f64::from(self.input_rate))
            .ceil() as usize;
        let mut output = Vec::new();
        interleave_into(&resampled, keep, &mut output);
        Ok(output)
    }

    /// Drop buffered input, e.g. after a seek.
    pub fn reset(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.reset();
        }
        self.pending.iter_mut().for_each(Vec::clear);
    }
}

fn interleave_into(planes: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = planes.first() else {
        return;
    };
    let frames = first.len().min(max_frames);
    output.reserve(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            output.push(plane[frame]);
        }
    }
}

/// Convert interleaved audio between channel counts.
///
/// Mono is duplicated onto every output channel, downmixing to mono
/// averages, and other layouts copy the leading channels and repeat the
/// last one for any extra outputs.
pub fn remix(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return input.to_vec();
    }

    let frames = input.len() / from;
    let mut output = Vec::with_capacity(frames * to);
    for frame in input.chunks_exact(from) {
        if to == 1 {
            #[allow(clippy::cast_precision_loss)]
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for channel in 0..to {
                output.push(frame[channel.min(from - 1)]);
            }
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_rate_passes_through() {
        let mut resampler = Resampler::new(48000, 48000, 2).unwrap();
        assert!(!resampler.needs_resampling());

        let input = vec![0.5f32; 2048];
        assert_eq!(resampler.process(&input).unwrap(), input);
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_rate_conversion_changes_length() {
        let mut resampler = Resampler::new(44100, 48000, 2).unwrap();
        assert!(resampler.needs_resampling());
        assert_eq!(resampler.input_rate(), 44100);
        assert_eq!(resampler.output_rate(), 48000);
        assert_eq!(resampler.channels(), 2);

        // Less than one chunk is held back until flush.
        assert!(resampler.process(&[0.0f32; 200]).unwrap().is_empty());
        let flushed = resampler.flush().unwrap();
        assert_eq!(flushed.len() % 2, 0);
        assert!(!flushed.is_empty());
    }

    #[test]
    fn test_reset_discards_pending_input() {
        let mut resampler = Resampler::new(22050, 48000, 1).unwrap();
        resampler.process(&[0.1f32; 100]).unwrap();
        resampler.reset();
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(Resampler::new(44100, 48000, 0).is_err());
    }

    #[test]
    fn test_remix_mono_to_stereo() {
        assert_eq!(remix(&[0.1, 0.2], 1, 2), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_remix_stereo_to_mono_averages() {
        assert_eq!(remix(&[0.25, 0.75, -1.0, 1.0], 2, 1), vec![0.5, 0.0]);
    }

    #[test]
    fn test_remix_surround_to_stereo_keeps_front() {
        let frame = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        assert_eq!(remix(&frame, 6, 2), vec![0.1, 0.2]);
    }
}
