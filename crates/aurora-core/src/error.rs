//! Error types for Aurora.

use thiserror::Error;

/// Result type alias using Aurora's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Aurora.
#[derive(Error, Debug)]
pub enum Error {
    // Network errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] HttpError),

    #[error("Network error: {0}")]
    Network(String),

    // Cache errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Playback errors
    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    // Generic errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Player is no longer running")]
    ChannelClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// HTTP-specific errors.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed with status {status}")]
    StatusError { status: u16 },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Returns true if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Http(HttpError::ConnectionFailed(_) | HttpError::Timeout)
        )
    }

    /// Returns true if this error came from the content store.
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }

    /// Returns true if this error means a track could not be played.
    pub const fn is_playback(&self) -> bool {
        matches!(self, Self::Playback(_))
    }

    /// Convert a failure on the load path into a playback failure.
    ///
    /// Storage, network and decode errors raised while resolving a track all
    /// surface to observers as [`Error::Playback`].
    #[must_use]
    pub fn into_playback(self) -> Self {
        match self {
            Self::Playback(_) => self,
            other => Self::Playback(other.to_string()),
        }
    }
}
