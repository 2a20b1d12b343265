//! Background prefetch that warms the content store ahead of playback.
//!
//! Jobs run on a fixed pool of worker threads fed by one FIFO channel, so at
//! most `concurrency` fetches are in flight and excess jobs wait in
//! submission order. Failures are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use aurora_core::{Error, Locator, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::fetch::{CancelToken, Fetcher};
use crate::store::ContentStore;

/// Default number of simultaneous prefetches.
pub const DEFAULT_PREFETCH_CONCURRENCY: usize = 2;

/// Prefetch scheduler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Worker pool size.
    pub concurrency: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_PREFETCH_CONCURRENCY,
        }
    }
}

struct Job {
    locator: Locator,
    token: CancelToken,
}

struct Shared {
    store: Arc<ContentStore>,
    fetcher: Arc<dyn Fetcher>,
    /// One entry per locator queued or in flight.
    pending: Mutex<HashMap<Locator, CancelToken>>,
}

impl Shared {
    fn run_job(&self, job: &Job) {
        if job.token.is_cancelled() {
            debug!("Skipping cancelled prefetch of {}", job.locator);
            return;
        }
        if self.store.has(&job.locator) {
            debug!("{} was cached while queued", job.locator);
            return;
        }

        match self.fetcher.fetch(&job.locator, &job.token) {
            Ok(_) if job.token.is_cancelled() => {
                debug!("Discarding prefetch of {} after cancel", job.locator);
            }
            Ok(bytes) => match self.store.store(&job.locator, &bytes) {
                Ok(_) => debug!("Prefetched {} ({} bytes)", job.locator, bytes.len()),
                Err(e) => warn!("Prefetch of {} not stored: {e}", job.locator),
            },
            Err(Error::Cancelled) => debug!("Prefetch of {} cancelled", job.locator),
            Err(e) => warn!("Prefetch of {} failed: {e}", job.locator),
        }
    }

    fn finish(&self, job: &Job) {
        let mut pending = self.pending.lock();
        // A cancel followed by a fresh prefetch installs a new token; leave it.
        if pending
            .get(&job.locator)
            .is_some_and(|token| token.same(&job.token))
        {
            pending.remove(&job.locator);
        }
    }
}

/// Bounded-concurrency background fetcher.
pub struct PrefetchScheduler {
    shared: Arc<Shared>,
    job_tx: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PrefetchScheduler {
    /// Create the scheduler and start its worker pool.
    pub fn new(
        store: Arc<ContentStore>,
        fetcher: Arc<dyn Fetcher>,
        config: PrefetchConfig,
    ) -> Result<Self> {
        if config.concurrency == 0 {
            return Err(Error::InvalidArgument(
                "prefetch concurrency must be at least 1".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            store,
            fetcher,
            pending: Mutex::new(HashMap::new()),
        });
        let (job_tx, job_rx) = unbounded();

        let mut workers = Vec::with_capacity(config.concurrency);
        for index in 0..config.concurrency {
            let shared = Arc::clone(&shared);
            let job_rx: Receiver<Job> = job_rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("prefetch-{index}"))
                .spawn(move || {
                    for job in job_rx {
                        shared.run_job(&job);
                        shared.finish(&job);
                    }
                })
                .map_err(|e| Error::Internal(format!("Failed to spawn prefetch worker: {e}")))?;
            workers.push(handle);
        }

        info!("Prefetch scheduler started with {} workers", config.concurrency);

        Ok(Self {
            shared,
            job_tx: Mutex::new(Some(job_tx)),
            workers: Mutex::new(workers),
        })
    }

    /// Queue fetches for every locator that is neither cached nor pending.
    ///
    /// Returns the number of newly queued jobs.
    pub fn prefetch(&self, locators: &[Locator]) -> usize {
        let job_tx = self.job_tx.lock();
        let Some(job_tx) = job_tx.as_ref() else {
            warn!("Prefetch requested after shutdown");
            return 0;
        };

        let mut pending = self.shared.pending.lock();
        let mut queued = 0;
        for locator in locators {
            if pending.contains_key(locator) {
                debug!("Prefetch of {locator} already pending");
                continue;
            }
            if self.shared.store.has(locator) {
                continue;
            }

            let token = CancelToken::new();
            let job = Job {
                locator: locator.clone(),
                token: token.clone(),
            };
            if job_tx.send(job).is_err() {
                warn!("Prefetch workers are gone");
                break;
            }
            pending.insert(locator.clone(), token);
            queued += 1;
        }

        if queued > 0 {
            debug!("Queued {queued} prefetch jobs");
        }
        queued
    }

    /// Cancel a queued or in-flight fetch. Returns whether one existed.
    pub fn cancel(&self, locator: &Locator) -> bool {
        match self.shared.pending.lock().remove(locator) {
            Some(token) => {
                token.cancel();
                debug!("Cancelled prefetch of {locator}");
                true
            }
            None => false,
        }
    }

    /// Check whether a fetch for `locator` is queued or in flight.
    pub fn is_pending(&self, locator: &Locator) -> bool {
        self.shared.pending.lock().contains_key(locator)
    }

    /// Number of queued plus in-flight fetches.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Cancel everything and stop the workers.
    pub fn shutdown(&self) {
        for (_, token) in self.shared.pending.lock().drain() {
            token.cancel();
        }
        // Dropping the sender ends each worker's receive loop.
        self.job_tx.lock().take();

        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                warn!("Prefetch worker panicked");
            }
        }
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
