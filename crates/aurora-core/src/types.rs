//! Core domain types for Aurora.

pub mod locator;
pub mod playback;
pub mod queue;
pub mod track;

pub use locator::Locator;
pub use playback::{PlaybackSnapshot, PlaybackState, PlaybackStatus};
pub use queue::{Direction, Queue, RepeatMode};
pub use track::Track;
