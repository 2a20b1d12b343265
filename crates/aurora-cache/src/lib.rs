//! # aurora-cache
//!
//! On-disk audio cache for Aurora.
//!
//! This crate provides:
//! - [`ContentStore`]: content-addressed blob storage with a byte ceiling
//! - [`Fetcher`]: the network seam, with an HTTP implementation
//! - [`PrefetchScheduler`]: bounded background warming of the store

pub mod fetch;
pub mod prefetch;
pub mod store;

pub use fetch::{CancelToken, Fetcher, HttpFetcher};
pub use prefetch::{PrefetchConfig, PrefetchScheduler};
pub use store::{CacheEntry, CacheStats, ContentStore, EntryPin, EvictionReport, StoreConfig};
