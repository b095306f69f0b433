//! ForecastCache — single source of truth for frames and listings.
//!
//! Entry lifecycle per `(station, timestamp)`:
//!
//! ```text
//!   (absent) --resolve--> Fetching { generation, fetch } --ok--> Resolved(frame)
//!                                                        \-err--> (absent)
//! ```
//!
//! A `Fetching` entry holds a shared future; every `resolve` for the same key
//! clones and awaits it, so at most one request per key is ever in flight.
//! The shared future writes its own outcome back into the cache, but only if
//! the cache generation still matches the one captured when it started.
//! `invalidate_all` bumps the generation, so late results from an older
//! forecast run are handed to whoever awaited them and then dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use forecast_proto::{metadata, Timestamp};
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tracing::{debug, info, warn};

use crate::source::{ForecastSource, SourceError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("forecast listing for {station} unavailable: {reason}")]
    SourceUnavailable { station: String, reason: SourceError },
    #[error("forecast frame {station}/{timestamp} failed: {reason}")]
    FetchFailed {
        station: String,
        timestamp: Timestamp,
        reason: SourceError,
    },
}

/// One resolved forecast frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: Timestamp,
    pub image: Arc<[u8]>,
    /// `None` when the payload carried no decodable metric.
    pub metric: Option<f64>,
}

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, CacheError>>>;
type FrameKey = (String, Timestamp);

enum Entry {
    Fetching {
        generation: u64,
        fetch: SharedFetch<Frame>,
    },
    Resolved(Frame),
}

enum Listing {
    Fetching(SharedFetch<Arc<[Timestamp]>>),
    Ready(Arc<[Timestamp]>),
}

#[derive(Default)]
struct Inner {
    generation: u64,
    listings: HashMap<String, Listing>,
    entries: HashMap<FrameKey, Entry>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ForecastCache<S> {
    source: Arc<S>,
    inner: Arc<Mutex<Inner>>,
}

impl<S> Clone for ForecastCache<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ForecastSource> ForecastCache<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn generation(&self) -> u64 {
        lock(&self.inner).generation
    }

    /// Ordered frame keys for `station`, fetched once per cache generation.
    pub async fn list_timestamps(&self, station: &str) -> Result<Arc<[Timestamp]>, CacheError> {
        let fetch = {
            let mut inner = lock(&self.inner);
            match inner.listings.get(station) {
                Some(Listing::Ready(times)) => return Ok(Arc::clone(times)),
                Some(Listing::Fetching(fetch)) => {
                    debug!("station {}: joining in-flight listing fetch", station);
                    fetch.clone()
                }
                None => {
                    let fetch = self.start_listing_fetch(station, inner.generation);
                    inner
                        .listings
                        .insert(station.to_string(), Listing::Fetching(fetch.clone()));
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Frame for `(station, timestamp)`.
    ///
    /// Already resolved entries return without suspending; a fetch already in
    /// flight for the key is joined instead of duplicated.
    pub async fn resolve(&self, station: &str, timestamp: &Timestamp) -> Result<Frame, CacheError> {
        let fetch = {
            let mut inner = lock(&self.inner);
            let key = (station.to_string(), timestamp.clone());
            match inner.entries.get(&key) {
                Some(Entry::Resolved(frame)) => return Ok(frame.clone()),
                Some(Entry::Fetching { fetch, generation }) => {
                    debug!(
                        "frame {}/{}: joining in-flight fetch (generation {})",
                        station, timestamp, generation
                    );
                    fetch.clone()
                }
                None => {
                    let generation = inner.generation;
                    let fetch = self.start_frame_fetch(key.clone(), generation);
                    inner.entries.insert(
                        key,
                        Entry::Fetching {
                            generation,
                            fetch: fetch.clone(),
                        },
                    );
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Synchronous lookup of an already resolved frame.
    pub fn get(&self, station: &str, timestamp: &Timestamp) -> Option<Frame> {
        let inner = lock(&self.inner);
        match inner.entries.get(&(station.to_string(), timestamp.clone())) {
            Some(Entry::Resolved(frame)) => Some(frame.clone()),
            _ => None,
        }
    }

    pub fn is_resolved(&self, station: &str, timestamp: &Timestamp) -> bool {
        self.get(station, timestamp).is_some()
    }

    /// Forget every frame and listing. In-flight fetches keep running but
    /// their results are no longer stored.
    pub fn invalidate_all(&self) {
        let mut inner = lock(&self.inner);
        inner.generation += 1;
        inner.listings.clear();
        inner.entries.clear();
        info!("forecast cache invalidated (generation {})", inner.generation);
    }

    /// Resolve every frame of the station in order so playback runs from
    /// memory. Returns how many frames resolved. Stops early once the cache
    /// has been invalidated.
    pub async fn prefetch_all(&self, station: &str) -> usize {
        let generation = self.generation();
        let times = match self.list_timestamps(station).await {
            Ok(times) => times,
            Err(e) => {
                warn!("prefetch skipped: {}", e);
                return 0;
            }
        };

        let mut resolved = 0;
        for timestamp in times.iter() {
            if self.generation() != generation {
                debug!("station {}: prefetch abandoned, cache moved on", station);
                return resolved;
            }
            match self.resolve(station, timestamp).await {
                Ok(_) => resolved += 1,
                Err(e) => warn!("prefetch: {}", e),
            }
        }
        info!(
            "station {}: prefetched {}/{} frames",
            station,
            resolved,
            times.len()
        );
        resolved
    }

    fn start_listing_fetch(&self, station: &str, generation: u64) -> SharedFetch<Arc<[Timestamp]>> {
        let request = self.source.forecast_times(station);
        let inner = Arc::clone(&self.inner);
        let station = station.to_string();
        async move {
            info!("station {}: fetching forecast listing", station);
            let outcome = request.await;
            let mut guard = lock(&inner);
            let current = guard.generation == generation;
            match outcome {
                Ok(times) => {
                    let times: Arc<[Timestamp]> = times.into();
                    if current {
                        info!("station {}: {} forecast frames listed", station, times.len());
                        guard
                            .listings
                            .insert(station, Listing::Ready(Arc::clone(&times)));
                    } else {
                        debug!("station {}: dropping listing from generation {}", station, generation);
                    }
                    Ok(times)
                }
                Err(reason) => {
                    if current {
                        guard.listings.remove(&station);
                    }
                    Err(CacheError::SourceUnavailable { station, reason })
                }
            }
        }
        .boxed()
        .shared()
    }

    fn start_frame_fetch(&self, key: FrameKey, generation: u64) -> SharedFetch<Frame> {
        let request = self.source.forecast_image(&key.0, &key.1);
        let inner = Arc::clone(&self.inner);
        async move {
            debug!("frame {}/{}: fetching (generation {})", key.0, key.1, generation);
            let outcome = request.await;
            let mut guard = lock(&inner);
            let current = guard.generation == generation;
            match outcome {
                Ok(bytes) => {
                    let metric = match metadata::decode(&bytes) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            warn!("frame {}/{}: {}", key.0, key.1, e);
                            None
                        }
                    };
                    let frame = Frame {
                        timestamp: key.1.clone(),
                        image: bytes.into(),
                        metric,
                    };
                    if current {
                        guard.entries.insert(key, Entry::Resolved(frame.clone()));
                    } else {
                        debug!(
                            "frame {}/{}: dropping result from generation {}",
                            key.0, key.1, generation
                        );
                    }
                    Ok(frame)
                }
                Err(reason) => {
                    if current {
                        guard.entries.remove(&key);
                    }
                    let (station, timestamp) = key;
                    Err(CacheError::FetchFailed {
                        station,
                        timestamp,
                        reason,
                    })
                }
            }
        }
        .boxed()
        .shared()
    }
}
