//! Conversion from WAQI DTOs to domain types.

use chrono::{DateTime, Utc};

use crate::domain::{Pollutant, Station, StationId, Status};

use super::error::WaqiError;
use super::types::{FeedData, FeedResponse, IaqiValue, STATUS_OK};

/// Error during DTO to domain conversion.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    /// Envelope says "ok" but carries no data node
    #[error("missing data node")]
    MissingData,

    /// Data node does not have the expected shape
    #[error("invalid data node: {0}")]
    InvalidData(String),

    /// Coordinates are not a `[lat, lon]` pair
    #[error("invalid geo coordinates: {0:?}")]
    InvalidGeo(Vec<f32>),

    /// Failed to parse the ISO timestamp
    #[error("invalid time: {0}")]
    InvalidTime(String),
}

/// Decode a raw feed body into a measurement.
///
/// `now` stands in for the measurement time when upstream omits it.
pub fn decode_feed(body: &str, now: DateTime<Utc>) -> Result<Status, WaqiError> {
    let feed: FeedResponse = serde_json::from_str(body).map_err(|e| WaqiError::MalformedData {
        message: e.to_string(),
        body: Some(body.chars().take(500).collect()),
    })?;

    if feed.status != STATUS_OK {
        return Err(WaqiError::upstream(feed.error_message()));
    }

    convert_feed(feed, now).map_err(|e| WaqiError::MalformedData {
        message: e.to_string(),
        body: None,
    })
}

/// Convert a successful envelope to a measurement.
pub fn convert_feed(feed: FeedResponse, now: DateTime<Utc>) -> Result<Status, ConversionError> {
    let data = feed.data.ok_or(ConversionError::MissingData)?;
    let data: FeedData =
        serde_json::from_value(data).map_err(|e| ConversionError::InvalidData(e.to_string()))?;
    convert_data(data, now)
}

fn convert_data(data: FeedData, now: DateTime<Utc>) -> Result<Status, ConversionError> {
    let &[lat, lon] = data.city.geo.as_slice() else {
        return Err(ConversionError::InvalidGeo(data.city.geo.clone()));
    };

    let time = match data.time.and_then(|t| t.iso) {
        Some(iso) => DateTime::parse_from_rfc3339(&iso)
            .map_err(|_| ConversionError::InvalidTime(iso))?
            .with_timezone(&Utc),
        None => now,
    };

    let iaqi = data.iaqi.unwrap_or_default();

    Ok(Status {
        station: Station {
            id: StationId::new(data.idx),
            name: data.city.name,
            url: data.city.url.filter(|u| !u.is_empty()),
            lat,
            lon,
        },
        time,
        aqi: data.aqi,
        level: Pollutant::Aqi.classify(data.aqi),
        pm25: value(iaqi.pm25),
        pm10: value(iaqi.pm10),
        o3: value(iaqi.o3),
        no2: value(iaqi.no2),
        so2: value(iaqi.so2),
        co: value(iaqi.co),
    })
}

fn value(node: Option<IaqiValue>) -> Option<f32> {
    node.and_then(|n| n.v)
}

#[cfg(test)]
pub(crate) mod samples {
    /// A trimmed real response for a Beijing station.
    pub const BEIJING: &str = r#"{
        "status": "ok",
        "data": {
            "aqi": 74,
            "idx": 1451,
            "attributions": [{"url": "http://www.bjmemc.com.cn/", "name": "Beijing Environmental Protection Monitoring Center"}],
            "city": {
                "geo": [39.954592, 116.468117],
                "name": "Beijing (北京)",
                "url": "https://aqicn.org/city/beijing"
            },
            "dominentpol": "pm25",
            "iaqi": {
                "co": {"v": 6.4},
                "h": {"v": 35},
                "no2": {"v": 18.3},
                "o3": {"v": 31.6},
                "p": {"v": 1016},
                "pm10": {"v": 44},
                "pm25": {"v": 74},
                "t": {"v": 12}
            },
            "time": {"s": "2024-03-15 18:00:00", "tz": "+08:00", "v": 1710525600, "iso": "2024-03-15T18:00:00+08:00"}
        }
    }"#;

    /// Station reporting AQI only.
    pub fn minimal(idx: i64, aqi: f32) -> String {
        format!(
            r#"{{"status":"ok","data":{{"aqi":{aqi},"idx":{idx},"city":{{"geo":[55.75,37.62],"name":"Station {idx}"}}}}}}"#
        )
    }
}
