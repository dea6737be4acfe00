//! Severity classification.
//!
//! Every pollutant has its own breakpoint table with five thresholds that
//! split the value range into six bands. A value strictly below the first
//! threshold is `Good`, strictly below the second is `Moderate`, and so on;
//! anything at or above the last threshold is `Hazardous`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Air quality severity, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// AQI 0 to 50. Air quality is satisfactory.
    Good,
    /// AQI 51 to 100. A concern for a very small number of unusually
    /// sensitive people.
    Moderate,
    /// AQI 101 to 150. Sensitive groups may experience health effects.
    PossiblyUnhealthy,
    /// AQI 151 to 200. Everyone may begin to experience health effects.
    Unhealthy,
    /// AQI 201 to 300. Health warnings of emergency conditions.
    VeryUnhealthy,
    /// AQI above 300. Health alert.
    Hazardous,
}

impl Level {
    /// All levels in ascending order of severity.
    pub const ALL: [Level; 6] = [
        Level::Good,
        Level::Moderate,
        Level::PossiblyUnhealthy,
        Level::Unhealthy,
        Level::VeryUnhealthy,
        Level::Hazardous,
    ];

    /// Human-readable label used in reports.
    pub fn label(self) -> &'static str {
        match self {
            Level::Good => "Good",
            Level::Moderate => "Satisfactory",
            Level::PossiblyUnhealthy => "Moderately polluted",
            Level::Unhealthy => "Poor",
            Level::VeryUnhealthy => "Very poor",
            Level::Hazardous => "Hazardous",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A quantity that has its own breakpoint table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pollutant {
    Aqi,
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl Pollutant {
    /// Sub-readings carried by a measurement, in report order.
    pub const READINGS: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
    ];

    /// Lower bounds of the Moderate..=Hazardous bands.
    pub fn breakpoints(self) -> [f32; 5] {
        match self {
            Pollutant::Aqi => [51.0, 101.0, 151.0, 201.0, 300.0],
            Pollutant::Pm10 => [51.0, 101.0, 251.0, 351.0, 430.0],
            Pollutant::Pm25 => [31.0, 61.0, 91.0, 121.0, 250.0],
            Pollutant::No2 => [41.0, 81.0, 181.0, 281.0, 401.0],
            Pollutant::O3 => [51.0, 101.0, 169.0, 209.0, 748.0],
            Pollutant::Co => [1.1, 2.1, 10.0, 17.0, 34.0],
            Pollutant::So2 => [41.0, 81.0, 381.0, 801.0, 1600.0],
        }
    }

    /// Classify a raw value of this pollutant.
    pub fn classify(self, value: f32) -> Level {
        self.breakpoints()
            .iter()
            .position(|&bound| value < bound)
            .map_or(Level::Hazardous, |band| Level::ALL[band])
    }

    pub fn name(self) -> &'static str {
        match self {
            Pollutant::Aqi => "AQI",
            Pollutant::Pm25 => "PM2.5",
            Pollutant::Pm10 => "PM10",
            Pollutant::O3 => "O3",
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::Co => "CO",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
