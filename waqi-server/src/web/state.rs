//! Application state for the web layer.

use std::sync::Arc;

use crate::service::AirQualityService;
use crate::waqi::WaqiClient;

/// Shared application state.
pub struct AppState<S = WaqiClient> {
    pub service: Arc<AirQualityService<S>>,
}

impl<S> AppState<S> {
    pub fn new(service: Arc<AirQualityService<S>>) -> Self {
        Self { service }
    }
}

// Derived Clone would require `S: Clone`.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}
