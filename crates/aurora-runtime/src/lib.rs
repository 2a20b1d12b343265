//! # aurora-runtime
//!
//! Configuration, logging and component wiring for the Aurora playback
//! core. A [`Runtime`] owns one of each component; there are no globals.

pub mod config;
pub mod logging;
pub mod runtime;

pub use config::RuntimeConfig;
pub use runtime::Runtime;
