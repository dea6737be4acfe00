//! The lookup interface shared by the HTTP client, the cache and the mock.

use std::future::Future;

use crate::domain::{StationId, Status};

use super::error::WaqiError;

/// Something that can answer "what is the air quality at ...".
pub trait StatusSource: Send + Sync + 'static {
    /// Current measurement of a station.
    fn by_station(&self, id: StationId) -> impl Future<Output = Result<Status, WaqiError>> + Send;

    /// Current measurement for a free-text place name.
    fn by_city(&self, city: &str) -> impl Future<Output = Result<Status, WaqiError>> + Send;

    /// Current measurement of the station nearest to a point.
    fn by_geo(&self, lat: f32, lon: f32)
    -> impl Future<Output = Result<Status, WaqiError>> + Send;

    /// Release held resources. Lookups after `close` may fail.
    fn close(&self) -> Result<(), WaqiError> {
        Ok(())
    }
}
