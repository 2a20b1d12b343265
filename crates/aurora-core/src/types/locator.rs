//! Opaque locators for stream and artwork resources.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Identifier of a remote or local resource, also used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `http://` and `https://` locators.
    pub fn is_remote(&self) -> bool {
        Url::parse(&self.0).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
    }

    /// Resolve `file://` URLs and bare paths to a filesystem path.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        match Url::parse(&self.0) {
            Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
            // Single-letter schemes are Windows drive letters.
            Ok(url) if url.scheme().len() > 1 => None,
            _ => Some(PathBuf::from(&self.0)),
        }
    }

    /// The last path segment, without query or fragment.
    pub fn last_segment(&self) -> Option<&str> {
        let path = self.0.split(['?', '#']).next().unwrap_or_default();
        path.rsplit(['/', '\\'])
            .next()
            .filter(|segment| !segment.is_empty())
    }

    /// Lowercased file extension of the last path segment, if it looks like one.
    pub fn extension(&self) -> Option<String> {
        let segment = self.last_segment()?;
        let (stem, ext) = segment.rsplit_once('.')?;
        if stem.is_empty()
            || ext.is_empty()
            || ext.len() > 8
            || !ext.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_url() {
        let locator = Locator::new("https://media.example.com/audio/Track01.MP3?token=abc");
        assert_eq!(locator.extension().as_deref(), Some("mp3"));
        assert_eq!(locator.last_segment(), Some("Track01.MP3"));
        assert!(locator.is_remote());
    }

    #[test]
    fn test_extension_missing() {
        assert_eq!(Locator::new("https://example.com/stream/42").extension(), None);
        assert_eq!(Locator::new("https://example.com/").extension(), None);
        assert_eq!(Locator::new("/music/.hidden").extension(), None);
    }

    #[test]
    fn test_file_paths() {
        let bare = Locator::new("/music/song.flac");
        assert_eq!(bare.to_file_path(), Some(PathBuf::from("/music/song.flac")));
        assert!(!bare.is_remote());

        let remote = Locator::new("https://example.com/song.flac");
        assert_eq!(remote.to_file_path(), None);
    }
}
