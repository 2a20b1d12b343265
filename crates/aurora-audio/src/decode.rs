//! Audio decoding using symphonia.

use std::fs::File;
use std::path::Path;

use aurora_core::{Error, Result};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    units::Time,
};
use tracing::{debug, warn};

/// Decoder for one cached audio file.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration: Option<f64>,
    samples: Option<SampleBuffer<f32>>,
}

impl AudioDecoder {
    /// Detect and open a file. `extension` is a format hint such as `"mp3"`.
    pub fn open(path: &Path, extension: Option<&str>) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::AudioDecode(format!("Failed to open {}: {e}", path.display()))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension.or_else(|| path.extension().and_then(|e| e.to_str())) {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let detected = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to detect format: {e}")))?;
        let format = detected.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(48000);
        let channels = track.codec_params.channels.map_or(2, |c| c.count());
        #[allow(clippy::cast_precision_loss)]
        let duration = track
            .codec_params
            .time_base
            .zip(track.codec_params.n_frames)
            .map(|(base, frames)| {
                let time = base.calc_time(frames);
                time.seconds as f64 + time.frac
            });

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to create decoder: {e}")))?;

        debug!(
            "Opened {}: track={track_id}, {sample_rate} Hz, {channels} channels, duration={duration:?}",
            path.display()
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration,
            samples: None,
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Total duration in seconds, when the container declares it.
    pub const fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Decode the next packet into interleaved samples.
    ///
    /// Returns `None` at end of stream. Corrupt frames are skipped.
    pub fn decode_next(&mut self) -> Result<Option<&[f32]>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(Error::AudioDecode(format!("Failed to read packet: {e}"))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let frames = decoded.capacity();
                    // Packets can grow mid-stream; reallocate only when they do.
                    if self
                        .samples
                        .as_ref()
                        .is_some_and(|b| b.capacity() < frames * spec.channels.count())
                    {
                        self.samples = None;
                    }
                    let buffer = self
                        .samples
                        .get_or_insert_with(|| SampleBuffer::new(frames as u64, spec));
                    buffer.copy_interleaved_ref(decoded);
                    return Ok(Some(buffer.samples()));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error (skipping): {e}");
                }
                Err(e) => return Err(Error::AudioDecode(format!("Decode failed: {e}"))),
            }
        }
    }

    /// Seek to a position in seconds.
    pub fn seek(&mut self, position_secs: f64) -> Result<()> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(position_secs),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::AudioDecode(format!("Seek failed: {e}")))?;
        self.decoder.reset();
        Ok(())
    }
}
