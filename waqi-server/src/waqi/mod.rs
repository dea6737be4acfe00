//! WAQI (World Air Quality Index) client.
//!
//! Three lookups are supported: by station index, by free-text city name
//! and by coordinates. All of them hit the same `/feed/...` endpoint and
//! return a single station's current measurement.
//!
//! Key characteristics of WAQI:
//! - Failures usually come back as HTTP 200 with `"status": "error"`
//! - Sensors without data are omitted from `iaqi` rather than zeroed
//! - City and coordinate lookups resolve to the nearest station, so the
//!   station in the reply is not known until the response arrives

mod client;
mod convert;
mod error;
mod mock;
mod source;
mod types;

pub use client::{DEFAULT_BASE_URL, WaqiClient, WaqiConfig};
pub use convert::{ConversionError, decode_feed};
pub use error::WaqiError;
pub use mock::{MockReply, MockWaqiClient};
pub use source::StatusSource;
pub use types::{CityInfo, FeedData, FeedResponse, Iaqi, IaqiValue, TimeInfo};

