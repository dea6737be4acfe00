//! Air quality measurements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::level::{Level, Pollutant};
use super::station::Station;

/// One snapshot of a station's readings.
///
/// Sub-readings are `None` when upstream does not report that sensor, which
/// is different from a reading of zero.
///
/// # Equality
///
/// Two statuses are equal when they belong to the same station, classify to
/// the same overall level, and carry exactly the same sub-readings. The
/// timestamp and the raw AQI value are ignored, so a fresh snapshot of an
/// unchanged station compares equal to the previous one. Sub-readings are
/// compared by value, so any change in a pollutant counts even if it stays
/// in the same band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub station: Station,

    /// When the measurement was taken (UTC).
    pub time: DateTime<Utc>,

    /// Air quality index value.
    pub aqi: f32,

    /// Level derived from `aqi`.
    pub level: Level,

    pub pm25: Option<f32>,
    pub pm10: Option<f32>,
    pub o3: Option<f32>,
    pub no2: Option<f32>,
    pub so2: Option<f32>,
    pub co: Option<f32>,
}

impl PartialEq for Status {
    fn eq(&self, other: &Self) -> bool {
        self.station.id == other.station.id
            && self.level == other.level
            && Pollutant::READINGS
                .iter()
                .all(|&p| self.reading(p) == other.reading(p))
    }
}

/// A single sub-reading with its classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f32,
    pub level: Level,
}

/// A sub-reading that differs between two statuses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingChange {
    pub pollutant: Pollutant,
    pub previous: Option<Reading>,
    pub current: Option<Reading>,
}

impl ReadingChange {
    /// True when the change moved the reading into a different band
    /// (including appearing or disappearing).
    pub fn crosses_level(&self) -> bool {
        self.previous.map(|r| r.level) != self.current.map(|r| r.level)
    }
}

impl Status {
    /// Raw value of a pollutant. For `Pollutant::Aqi` this is the index.
    pub fn reading(&self, pollutant: Pollutant) -> Option<f32> {
        match pollutant {
            Pollutant::Aqi => Some(self.aqi),
            Pollutant::Pm25 => self.pm25,
            Pollutant::Pm10 => self.pm10,
            Pollutant::O3 => self.o3,
            Pollutant::No2 => self.no2,
            Pollutant::So2 => self.so2,
            Pollutant::Co => self.co,
        }
    }

    /// Classified level of a pollutant, if it was reported.
    pub fn level_of(&self, pollutant: Pollutant) -> Option<Level> {
        match pollutant {
            Pollutant::Aqi => Some(self.level),
            p => self.reading(p).map(|v| p.classify(v)),
        }
    }

    fn classified(&self, pollutant: Pollutant) -> Option<Reading> {
        Some(Reading {
            value: self.reading(pollutant)?,
            level: self.level_of(pollutant)?,
        })
    }

    /// Sub-readings (and AQI) whose values differ from `previous`, in report
    /// order with AQI first.
    pub fn changes_since(&self, previous: &Status) -> Vec<ReadingChange> {
        std::iter::once(Pollutant::Aqi)
            .chain(Pollutant::READINGS)
            .filter(|&p| self.reading(p) != previous.reading(p))
            .map(|p| ReadingChange {
                pollutant: p,
                previous: previous.classified(p),
                current: self.classified(p),
            })
            .collect()
    }
}
