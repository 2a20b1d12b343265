//! # aurora-core
//!
//! Core types, traits, and error handling for the Aurora music player.

pub mod error;
pub mod history;
pub mod source;
pub mod types;

pub use error::{Error, HttpError, Result};
pub use history::{HistoryStats, PlayHistory, PlayRecord};
pub use source::{MediaSource, StaticSource, TrackQuery};
pub use types::*;
