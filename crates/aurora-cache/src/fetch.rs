//! Fetching stream bytes from their locators.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aurora_core::{Error, HttpError, Locator, Result};
use bytes::Bytes;
use tracing::{debug, trace};

/// Read size between cancellation checks.
const CHUNK_SIZE: usize = 64 * 1024;

/// Shared cancellation flag for an in-flight transfer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Fail with [`Error::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Whether two tokens refer to the same transfer.
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Source of audio bytes for a locator.
pub trait Fetcher: Send + Sync {
    /// Fetch the full blob. Implementations should give up with
    /// [`Error::Cancelled`] soon after `cancel` fires.
    fn fetch(&self, locator: &Locator, cancel: &CancelToken) -> Result<Bytes>;
}

/// Fetcher for `http(s)://` locators, `file://` URLs and bare paths.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }

    fn fetch_remote(&self, locator: &Locator, cancel: &CancelToken) -> Result<Bytes> {
        let response = self
            .agent
            .get(locator.as_str())
            .header("Accept", "audio/*, */*")
            .call()
            .map_err(map_ureq_error)?;

        let mut reader = response.into_body().into_reader();
        let mut data = Vec::new();
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            cancel.check()?;
            let read = reader
                .read(&mut chunk)
                .map_err(|e| Error::Network(format!("Failed to read response: {e}")))?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            trace!("Read {} bytes from {locator}", data.len());
        }

        debug!("Fetched {} bytes from {locator}", data.len());
        Ok(Bytes::from(data))
    }

    fn fetch_local(locator: &Locator, cancel: &CancelToken) -> Result<Bytes> {
        cancel.check()?;
        let path = locator
            .to_file_path()
            .ok_or_else(|| Error::Http(HttpError::InvalidUrl(locator.to_string())))?;
        let data = std::fs::read(&path)
            .map_err(|e| Error::Network(format!("Failed to read {}: {e}", path.display())))?;
        cancel.check()?;
        Ok(Bytes::from(data))
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, locator: &Locator, cancel: &CancelToken) -> Result<Bytes> {
        if locator.is_remote() {
            self.fetch_remote(locator, cancel)
        } else {
            Self::fetch_local(locator, cancel)
        }
    }
}

fn map_ureq_error(err: ureq::Error) -> Error {
    match err {
        ureq::Error::StatusCode(status) => Error::Http(HttpError::StatusError { status }),
        ureq::Error::Timeout(_) => Error::Http(HttpError::Timeout),
        ureq::Error::Io(e) => Error::Http(HttpError::ConnectionFailed(e.to_string())),
        other => Error::Network(format!("HTTP request failed: {other}")),
    }
}
