//! Single entry point to the air quality engine.
//!
//! `AirQualityService` combines on-demand lookups (served through the TTL
//! cache), station subscriptions and the background updater behind one
//! handle. On-demand lookups never register interest in a station; they only
//! share the cache with the updater.

use std::sync::Arc;
use std::time::Duration;

use tracing::{Span, info, info_span};

use crate::cache::{CacheConfig, CachedWaqiClient};
use crate::domain::{StationId, Status};
use crate::updates::{DEFAULT_POLL_PERIOD, Listener, UpdateScheduler};
use crate::waqi::{StatusSource, WaqiClient, WaqiConfig, WaqiError};

/// Configuration for the whole engine.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub waqi: WaqiConfig,
    pub cache: CacheConfig,

    /// Period of the background refresh.
    pub poll_period: Duration,
}

impl ServiceConfig {
    /// Production defaults with the given API token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            waqi: WaqiConfig::new(token),
            cache: CacheConfig::default(),
            poll_period: DEFAULT_POLL_PERIOD,
        }
    }

    pub fn with_waqi(mut self, waqi: WaqiConfig) -> Self {
        self.waqi = waqi;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }
}

/// Air quality lookups, subscriptions and background updates.
pub struct AirQualityService<S = WaqiClient> {
    cache: Arc<CachedWaqiClient<S>>,
    scheduler: UpdateScheduler<CachedWaqiClient<S>>,
    span: Span,
}

impl AirQualityService<WaqiClient> {
    /// Build the engine against the real WAQI API.
    ///
    /// Opens (or creates) the cache store; no request is made yet.
    pub fn connect(config: &ServiceConfig, span: Span) -> Result<Self, WaqiError> {
        let client = WaqiClient::new(
            config.waqi.clone(),
            info_span!(parent: &span, "client"),
        )?;
        Self::with_source(client, config, span)
    }
}

impl<S: StatusSource> AirQualityService<S> {
    /// Build the engine on top of any source (e.g. `MockWaqiClient`).
    ///
    /// `config.waqi` is ignored.
    pub fn with_source(source: S, config: &ServiceConfig, span: Span) -> Result<Self, WaqiError> {
        let cache = Arc::new(CachedWaqiClient::new(
            source,
            &config.cache,
            info_span!(parent: &span, "cache"),
        )?);
        let scheduler = UpdateScheduler::new(
            Arc::clone(&cache),
            config.poll_period,
            info_span!(parent: &span, "updates"),
        );
        Ok(Self {
            cache,
            scheduler,
            span,
        })
    }

    /// Current measurement of a station.
    pub async fn by_station(&self, id: StationId) -> Result<Status, WaqiError> {
        self.cache.by_station(id).await
    }

    /// Current measurement for a place name.
    pub async fn by_city(&self, city: &str) -> Result<Status, WaqiError> {
        self.cache.by_city(city).await
    }

    /// Current measurement of the station nearest to a point.
    pub async fn by_geo(&self, lat: f32, lon: f32) -> Result<Status, WaqiError> {
        self.cache.by_geo(lat, lon).await
    }

    /// Notify `listener` whenever `station` changes.
    pub async fn subscribe(&self, station: StationId, listener: Arc<dyn Listener>) {
        self.scheduler.subscribe(station, listener).await;
    }

    pub async fn unsubscribe(&self, station: StationId, listener: &Arc<dyn Listener>) {
        self.scheduler.unsubscribe(station, listener).await;
    }

    pub async fn start_updates(&self) {
        self.scheduler.start_updates().await;
    }

    pub async fn stop_updates(&self) {
        self.scheduler.stop_updates().await;
    }

    /// The background scheduler, for inspection.
    pub fn scheduler(&self) -> &UpdateScheduler<CachedWaqiClient<S>> {
        &self.scheduler
    }

    /// The cache-wrapped source.
    pub fn cache(&self) -> &CachedWaqiClient<S> {
        &self.cache
    }

    /// Stop updates and release the upstream client and the cache store.
    ///
    /// Lookups made after this fail with a store error.
    pub async fn close(&self) -> Result<(), WaqiError> {
        self.scheduler.stop_updates().await;
        self.cache.close()?;
        info!(parent: &self.span, "service closed");
        Ok(())
    }
}
