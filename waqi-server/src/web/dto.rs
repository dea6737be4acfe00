//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

/// Query string for `/api/status/geo`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GeoQuery {
    pub lat: f32,
    pub lon: f32,
}

impl GeoQuery {
    /// Whether the coordinates are on the globe.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub updates_running: bool,
    pub subscribed_stations: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
