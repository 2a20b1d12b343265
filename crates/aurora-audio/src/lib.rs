//! # aurora-audio
//!
//! Playback for Aurora.
//!
//! Features:
//! - symphonia decoding of cached files, rubato resampling, cpal output
//! - a ten-band equalizer with reverb and distortion presets
//! - [`PlaybackEngine`]: the playback state machine and the one audio output
//! - [`QueueController`]: queue order, shuffle, repeat and track advance
//! - [`Player`]: a single owner thread serializing both behind [`PlayerHandle`]

pub mod buffer;
pub mod controller;
pub mod decode;
pub mod effects;
pub mod engine;
pub mod event;
pub mod loader;
pub mod output;
pub mod player;
pub mod resample;
pub mod sink;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use controller::QueueController;
pub use effects::{EffectChain, EffectPreset, EffectSettings, EqGains, EQ_BANDS};
pub use engine::{PlaybackEngine, PlaybackFailure};
pub use event::PlayerEvent;
pub use player::{Player, PlayerComponents, PlayerConfig, PlayerHandle};
pub use sink::{AudioSink, CpalSink, SinkFactory, SinkStatus};
