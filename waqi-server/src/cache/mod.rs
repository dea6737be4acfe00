//! Caching layer for WAQI lookups.
//!
//! Measurements are cached under every key they can be asked for by: the
//! station index, the lowercase station name and the station coordinates
//! rounded to two decimals. Whichever way a station is first resolved, later
//! lookups by the other schemes are served from the same entry.
//!
//! Entries are checked for age on read. An entry whose age has reached the
//! TTL is refetched; there is no stale fallback if that refetch fails.
//!
//! Concurrent misses for the same key are not coalesced: each caller fetches
//! from upstream independently and the last write wins. That costs the
//! occasional duplicate request and nothing else.

mod store;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{Span, debug};

use crate::domain::{StationId, Status};
use crate::waqi::{StatusSource, WaqiError};

pub use store::{CacheStore, CachedStatus, StoreError};

/// Default maximum age of a cached measurement: 15 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Source of "now" for age checks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// A cache key. Its `Display` form is the stored key string.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheKey {
    Station(StationId),
    /// Lowercased name.
    City(String),
    Geo { lat: f32, lon: f32 },
}

impl CacheKey {
    pub fn city(name: &str) -> Self {
        CacheKey::City(name.to_lowercase())
    }

    /// Every key under which `status` is stored.
    pub fn all_for(status: &Status) -> [CacheKey; 3] {
        [
            CacheKey::city(&status.station.name),
            CacheKey::Station(status.station.id),
            CacheKey::Geo {
                lat: status.station.lat,
                lon: status.station.lon,
            },
        ]
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Station(id) => write!(f, "station/{}", id.get()),
            CacheKey::City(name) => write!(f, "city/{name}"),
            CacheKey::Geo { lat, lon } => write!(f, "geo/{lat:.2}/{lon:.2}"),
        }
    }
}

/// Where the cache store lives.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub location: StoreLocation,

    /// Entries at least this old are refetched.
    pub ttl: Duration,
}

impl CacheConfig {
    /// Cache stored at `path` with the default TTL.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            ttl: DEFAULT_TTL,
        }
    }

    /// Cache that is discarded on shutdown.
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            ttl: DEFAULT_TTL,
        }
    }

    /// Set a custom TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn open(&self) -> Result<CacheStore, StoreError> {
        match &self.location {
            StoreLocation::File(path) => CacheStore::open(path),
            StoreLocation::Memory => CacheStore::open_in_memory(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new("data/waqi-cache.sqlite3")
    }
}

/// WAQI source with caching.
///
/// Wraps any `StatusSource` and is one itself, so the updater and the
/// on-demand queries can share it.
pub struct CachedWaqiClient<S> {
    source: S,
    store: CacheStore,
    ttl: Duration,
    clock: Clock,
    span: Span,
}

impl<S: StatusSource> CachedWaqiClient<S> {
    /// Open the store described by `config` and wrap `source`.
    pub fn new(source: S, config: &CacheConfig, span: Span) -> Result<Self, WaqiError> {
        Ok(Self {
            source,
            store: config.open()?,
            ttl: config.ttl,
            clock: Arc::new(Utc::now),
            span,
        })
    }

    /// Replace the clock used for age checks and capture times.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Get the measurement cached under `key`, or fetch it.
    ///
    /// On a miss or an expired entry, `fetch` is called and its result is
    /// stored under `key` and under every key derived from the returned
    /// measurement. Errors from the store or from `fetch` are returned as-is.
    pub async fn lookup<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<Status, WaqiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Status, WaqiError>>,
    {
        let key_str = key.to_string();

        if let Some(cached) = self.store.get(&key_str).await? {
            let age = (self.clock)().signed_duration_since(cached.captured_at);
            if age.num_milliseconds() < self.ttl.as_millis() as i64 {
                debug!(parent: &self.span, key = %key_str, "cache hit");
                return Ok(cached.status);
            }
            debug!(parent: &self.span, key = %key_str, age_ms = age.num_milliseconds(), "cache entry expired");
        } else {
            debug!(parent: &self.span, key = %key_str, "cache miss");
        }

        let status = fetch().await?;

        let entry = CachedStatus {
            captured_at: (self.clock)(),
            status,
        };

        let mut keys = vec![key_str];
        for derived in CacheKey::all_for(&entry.status) {
            let derived = derived.to_string();
            if !keys.contains(&derived) {
                keys.push(derived);
            }
        }
        self.store.put(keys, &entry).await?;

        Ok(entry.status)
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}

impl<S: StatusSource> StatusSource for CachedWaqiClient<S> {
    async fn by_station(&self, id: StationId) -> Result<Status, WaqiError> {
        self.lookup(&CacheKey::Station(id), || self.source.by_station(id))
            .await
    }

    async fn by_city(&self, city: &str) -> Result<Status, WaqiError> {
        self.lookup(&CacheKey::city(city), || self.source.by_city(city))
            .await
    }

    async fn by_geo(&self, lat: f32, lon: f32) -> Result<Status, WaqiError> {
        self.lookup(&CacheKey::Geo { lat, lon }, || self.source.by_geo(lat, lon))
            .await
    }

    /// Close the wrapped source, then the store.
    fn close(&self) -> Result<(), WaqiError> {
        self.source.close()?;
        self.store.close()?;
        Ok(())
    }
}
