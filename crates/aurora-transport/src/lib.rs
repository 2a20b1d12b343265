//! # aurora-transport
//!
//! The outward face of the player.
//!
//! - [`TransportBridge`] republishes playback state to UI observers and
//!   system remote-control surfaces
//! - [`RemoteCommander`] applies lock-screen and media-key commands and
//!   reports whether they took effect
//! - `SystemControls` (feature `system-controls`) registers with the OS
//!   media service via souvlaki

pub mod bridge;
pub mod command;
pub mod now_playing;
#[cfg(feature = "system-controls")]
pub mod system;

pub use bridge::TransportBridge;
pub use command::{CommandStatus, RemoteCommand, RemoteCommander};
pub use now_playing::{NowPlaying, RemoteSurface};
#[cfg(feature = "system-controls")]
pub use system::SystemControls;
