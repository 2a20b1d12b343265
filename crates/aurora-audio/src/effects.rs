//! Ten-band equalizer, reverb and distortion applied to decoded audio.
//!
//! The chain runs at the source sample rate on interleaved samples that
//! already have the device channel count. A flat or disabled chain leaves
//! samples untouched.

use std::f32::consts::{LN_2, PI};

use aurora_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of equalizer bands.
pub const EQ_BANDS: usize = 10;

/// Center frequency of each band in Hz.
pub const BAND_FREQUENCIES: [f32; EQ_BANDS] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Width of every band in octaves.
const BAND_WIDTH_OCTAVES: f32 = 0.5;

/// Largest boost or cut accepted for a band, in dB.
pub const MAX_BAND_GAIN_DB: f32 = 24.0;

/// Equalizer gains in dB, lowest band first.
pub type EqGains = [f32; EQ_BANDS];

const FLAT: EqGains = [0.0; EQ_BANDS];

/// Named effect presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectPreset {
    #[default]
    None,
    Bass,
    Treble,
    Vocal,
    Rock,
    Pop,
    Classical,
    /// Gains set band by band.
    Custom,
}

impl EffectPreset {
    /// Presets that carry their own gains.
    pub const BUILT_IN: [Self; 6] = [
        Self::Bass,
        Self::Treble,
        Self::Vocal,
        Self::Rock,
        Self::Pop,
        Self::Classical,
    ];

    /// Equalizer gains of a built-in preset. `Custom` has none.
    pub const fn gains(self) -> Option<EqGains> {
        match self {
            Self::None => Some(FLAT),
            Self::Bass => Some([-5.0, 4.0, 4.0, 3.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            Self::Treble => Some([0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 3.0, 4.0, 4.0, 5.0]),
            Self::Vocal => Some([-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 2.0, 0.0, -1.0, -2.0]),
            Self::Rock => Some([4.0, 3.0, 2.0, 0.0, -1.0, -1.0, 2.0, 3.0, 4.0, 4.0]),
            Self::Pop => Some([-1.0, 0.0, 2.0, 4.0, 3.0, 1.0, 0.0, -1.0, -1.0, -2.0]),
            Self::Classical => Some([3.0, 2.0, 1.0, 0.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0]),
            Self::Custom => None,
        }
    }
}

/// Everything the effect chain needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub enabled: bool,
    pub preset: EffectPreset,
    pub gains: EqGains,
    /// Reverb wet share, 0 to 100 percent.
    pub reverb_mix: f32,
    /// Gain into the distortion stage, in dB.
    pub distortion_pre_gain: f32,
    /// Distortion wet share, 0 to 100 percent.
    pub distortion_mix: f32,
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            preset: EffectPreset::None,
            gains: FLAT,
            reverb_mix: 0.0,
            distortion_pre_gain: 0.0,
            distortion_mix: 0.0,
        }
    }
}

impl EffectSettings {
    /// Settings for a preset, including its reverb and distortion.
    ///
    /// `Custom` keeps flat gains until [`EffectSettings::custom`] sets them.
    pub fn preset(preset: EffectPreset) -> Self {
        let (reverb_mix, distortion_pre_gain, distortion_mix) = match preset {
            EffectPreset::Rock => (20.0, 3.0, 30.0),
            EffectPreset::Pop => (15.0, 0.0, 0.0),
            EffectPreset::Classical => (40.0, 0.0, 0.0),
            _ => (0.0, 0.0, 0.0),
        };
        Self {
            preset,
            gains: preset.gains().unwrap_or(FLAT),
            reverb_mix,
            distortion_pre_gain,
            distortion_mix,
            ..Self::default()
        }
    }

    /// Hand-set equalizer gains with no reverb or distortion.
    pub fn custom(gains: EqGains) -> Result<Self> {
        Ok(Self {
            preset: EffectPreset::Custom,
            gains: validate_gains(gains)?,
            ..Self::default()
        })
    }

    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_reverb(mut self, mix: f32) -> Self {
        self.reverb_mix = mix.clamp(0.0, 100.0);
        self
    }

    #[must_use]
    pub fn with_distortion(mut self, pre_gain: f32, mix: f32) -> Self {
        self.distortion_pre_gain = pre_gain.clamp(-80.0, 20.0);
        self.distortion_mix = mix.clamp(0.0, 100.0);
        self
    }

    /// Whether processing would leave every sample unchanged.
    pub fn is_bypass(&self) -> bool {
        !self.enabled
            || (self.gains.iter().all(|g| g.abs() < f32::EPSILON)
                && self.reverb_mix <= 0.0
                && self.distortion_mix <= 0.0)
    }
}

/// Reject non-finite gains and clamp the rest to the accepted range.
pub fn validate_gains(gains: EqGains) -> Result<EqGains> {
    if let Some(bad) = gains.iter().find(|g| !g.is_finite()) {
        return Err(Error::InvalidArgument(format!("invalid band gain {bad}")));
    }
    Ok(gains.map(|g| g.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB)))
}

/// Normalized biquad coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    const UNITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Peaking filter from the audio EQ cookbook.
    fn peaking(sample_rate: f32, freq: f32, gain_db: f32) -> Self {
        // Bands at or above Nyquist cannot be realised at this rate.
        if gain_db.abs() < f32::EPSILON || freq >= sample_rate * 0.49 {
            return Self::UNITY;
        }

        let a = 10f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 * (LN_2 / 2.0 * BAND_WIDTH_OCTAVES * w0 / sin_w0).sinh();

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }
}

/// Transposed direct form II state for one channel.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f32,
    z2: f32,
}

impl BiquadState {
    fn process(&mut self, c: &Coefficients, x: f32) -> f32 {
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }
}

#[derive(Debug, Clone)]
struct Band {
    coefficients: Coefficients,
    states: Vec<BiquadState>,
}

/// Feedback comb with a one-pole lowpass in the loop.
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    index: usize,
    store: f32,
}

impl Comb {
    const FEEDBACK: f32 = 0.84;
    const DAMP: f32 = 0.2;

    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
            store: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let out = self.buffer[self.index];
        self.store = out * (1.0 - Self::DAMP) + self.store * Self::DAMP;
        self.buffer[self.index] = x + self.store * Self::FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    const FEEDBACK: f32 = 0.5;

    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let delayed = self.buffer[self.index];
        let out = delayed - x;
        self.buffer[self.index] = x + delayed * Self::FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }
}

/// Small Schroeder reverb for one channel.
#[derive(Debug, Clone)]
struct Reverb {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Reverb {
    /// Delay lengths in samples at 44.1 kHz.
    const COMBS: [usize; 4] = [1116, 1188, 1277, 1356];
    const ALLPASSES: [usize; 2] = [556, 441];
    /// Extra delay for odd channels, which decorrelates stereo.
    const SPREAD: usize = 23;
    const INPUT_GAIN: f32 = 0.015;

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn new(sample_rate: u32, channel: usize) -> Self {
        let scale = f64::from(sample_rate) / 44_100.0;
        let spread = if channel % 2 == 1 { Self::SPREAD } else { 0 };
        let len = |base: usize| ((base + spread) as f64 * scale) as usize;
        Self {
            combs: Self::COMBS.iter().map(|&n| Comb::new(len(n))).collect(),
            allpasses: Self::ALLPASSES.iter().map(|&n| Allpass::new(len(n))).collect(),
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let input = x * Self::INPUT_GAIN;
        let wet: f32 = self.combs.iter_mut().map(|c| c.process(input)).sum();
        self.allpasses.iter_mut().fold(wet, |acc, a| a.process(acc))
    }
}

/// The per-file effect chain: equalizer, then reverb, then distortion.
#[derive(Debug, Clone)]
pub struct EffectChain {
    sample_rate: u32,
    channels: usize,
    settings: EffectSettings,
    bands: Vec<Band>,
    reverbs: Vec<Reverb>,
}

impl EffectChain {
    pub fn new(sample_rate: u32, channels: usize, settings: EffectSettings) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(Error::InvalidArgument(format!(
                "effect chain needs a sample rate and channels, got {sample_rate} Hz x {channels}"
            )));
        }

        let mut chain = Self {
            sample_rate,
            channels,
            settings,
            bands: (0..EQ_BANDS)
                .map(|_| Band {
                    coefficients: Coefficients::UNITY,
                    states: vec![BiquadState::default(); channels],
                })
                .collect(),
            reverbs: (0..channels).map(|ch| Reverb::new(sample_rate, ch)).collect(),
        };
        chain.configure(settings);
        Ok(chain)
    }

    pub const fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    /// Apply new settings. Filter state carries over so changes do not click.
    #[allow(clippy::cast_precision_loss)]
    pub fn configure(&mut self, settings: EffectSettings) {
        let rate = self.sample_rate as f32;
        for ((band, freq), gain) in self
            .bands
            .iter_mut()
            .zip(BAND_FREQUENCIES)
            .zip(settings.gains)
        {
            band.coefficients = Coefficients::peaking(rate, freq, gain);
        }
        self.settings = settings;
    }

    /// Process interleaved samples in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        if self.settings.is_bypass() {
            return;
        }

        let reverb_wet = self.settings.reverb_mix / 100.0;
        let drive = 10f32.powf(self.settings.distortion_pre_gain / 20.0);
        let distortion_wet = self.settings.distortion_mix / 100.0;

        for frame in samples.chunks_mut(self.channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let mut x = *sample;
                for band in &mut self.bands {
                    x = band.states[ch].process(&band.coefficients, x);
                }
                if reverb_wet > 0.0 {
                    let wet = self.reverbs[ch].process(x);
                    x = x * (1.0 - reverb_wet) + wet * reverb_wet;
                }
                if distortion_wet > 0.0 {
                    x = x * (1.0 - distortion_wet) + (x * drive).tanh() * distortion_wet;
                }
                *sample = x.clamp(-1.0, 1.0);
            }
        }
    }

    /// Drop filter and reverb history, e.g. after a seek.
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.states.fill(BiquadState::default());
        }
        self.reverbs = (0..self.channels)
            .map(|ch| Reverb::new(self.sample_rate, ch))
            .collect();
    }
}
