//! WAQI feed response DTOs.
//!
//! These map directly to the `/feed/...` JSON. WAQI omits sensors it has no
//! data for, so nearly everything below `data` is optional.

use serde::Deserialize;

/// Status discriminator for successful responses.
pub const STATUS_OK: &str = "ok";

/// Top-level envelope.
///
/// `data` is kept raw because on failure WAQI puts the error text there as
/// a plain string instead of an object.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedResponse {
    pub status: String,

    /// Error text, used by some failure responses.
    pub message: Option<String>,

    pub data: Option<serde_json::Value>,
}

impl FeedResponse {
    /// Best-effort error text for a failed response.
    pub fn error_message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        match &self.data {
            Some(serde_json::Value::String(s)) => s.clone(),
            _ => format!("server returned status \"{}\"", self.status),
        }
    }
}

/// The `data` node of a successful response.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedData {
    /// Station index.
    pub idx: i64,

    /// Overall AQI.
    pub aqi: f32,

    pub city: CityInfo,

    /// Individual AQI readings per pollutant.
    #[serde(default)]
    pub iaqi: Option<Iaqi>,

    pub time: Option<TimeInfo>,
}

/// The `data.city` node.
#[derive(Debug, Clone, Deserialize)]
pub struct CityInfo {
    pub name: String,
    pub url: Option<String>,

    /// `[lat, lon]`.
    #[serde(default)]
    pub geo: Vec<f32>,
}

/// The `data.iaqi` node. Weather fields (`t`, `h`, `p`, `w`, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Iaqi {
    pub pm25: Option<IaqiValue>,
    pub pm10: Option<IaqiValue>,
    pub o3: Option<IaqiValue>,
    pub no2: Option<IaqiValue>,
    pub so2: Option<IaqiValue>,
    pub co: Option<IaqiValue>,
}

/// A `{ "v": 12.3 }` node.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IaqiValue {
    pub v: Option<f32>,
}

/// The `data.time` node.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeInfo {
    /// ISO 8601 timestamp with offset, e.g. `2024-03-15T10:00:00+08:00`.
    pub iso: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_message_field() {
        let resp: FeedResponse =
            serde_json::from_str(r#"{"status":"error","message":"Invalid key"}"#).unwrap();
        assert_eq!(resp.error_message(), "Invalid key");
    }

    #[test]
    fn error_message_falls_back_to_data_string() {
        let resp: FeedResponse =
            serde_json::from_str(r#"{"status":"error","data":"Unknown station"}"#).unwrap();
        assert_eq!(resp.error_message(), "Unknown station");
    }

    #[test]
    fn error_message_without_text() {
        let resp: FeedResponse = serde_json::from_str(r#"{"status":"nug"}"#).unwrap();
        assert_eq!(resp.error_message(), "server returned status \"nug\"");
    }
}
