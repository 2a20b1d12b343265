//! On-demand fetch-then-store for tracks missing from the cache.

use std::path::PathBuf;
use std::sync::Arc;

use aurora_cache::{CancelToken, ContentStore, EntryPin, Fetcher};
use aurora_core::{Error, Locator, Result};
use crossbeam_channel::Sender;
use tracing::debug;

/// Completion of one on-demand load.
#[derive(Debug)]
pub struct LoadFinished {
    /// Identifies the load that produced this result.
    pub ticket: u64,
    pub locator: Locator,
    pub result: Result<PathBuf>,
    /// Keeps the stored file out of eviction sweeps until it is opened.
    pub pin: EntryPin,
}

/// Runs foreground fetches on their own threads and reports back on a channel.
///
/// These fetches ignore the prefetch scheduler: the listener is waiting.
pub struct OnDemandLoader {
    store: Arc<ContentStore>,
    fetcher: Arc<dyn Fetcher>,
    done_tx: Sender<LoadFinished>,
}

impl OnDemandLoader {
    pub fn new(
        store: Arc<ContentStore>,
        fetcher: Arc<dyn Fetcher>,
        done_tx: Sender<LoadFinished>,
    ) -> Self {
        Self {
            store,
            fetcher,
            done_tx,
        }
    }

    /// Start fetching `locator`. The returned token cancels the transfer.
    pub fn spawn(&self, ticket: u64, locator: Locator) -> Result<CancelToken> {
        let token = CancelToken::new();
        let cancel = token.clone();
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let done_tx = self.done_tx.clone();

        std::thread::Builder::new()
            .name("fetch-ondemand".to_string())
            .spawn(move || {
                debug!("On-demand fetch of {locator} (ticket {ticket})");
                let pin = store.pin(&locator);
                let result = fetcher.fetch(&locator, &cancel).and_then(|bytes| {
                    cancel.check()?;
                    store.store(&locator, &bytes)
                });
                // The player may be gone; nothing to report to then.
                let _ = done_tx.send(LoadFinished {
                    ticket,
                    locator,
                    result,
                    pin,
                });
            })
            .map_err(|e| Error::Internal(format!("Failed to spawn fetch thread: {e}")))?;

        Ok(token)
    }
}
