//! Domain types for air quality measurements.
//!
//! These types are independent of the WAQI wire format; the client converts
//! responses into them and the cache stores them as-is.

mod level;
mod station;
mod status;

pub use level::{Level, Pollutant};
pub use station::{Station, StationId};
pub use status::{Reading, ReadingChange, Status};

#[cfg(test)]
pub(crate) use status::fixtures;
