//! Monitoring station types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable upstream identifier of a monitoring station (the WAQI `idx`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(i64);

impl StationId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A monitoring station as reported alongside a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Upstream identifier.
    pub id: StationId,

    /// Display name, e.g. "Beijing US Embassy, Beijing".
    pub name: String,

    /// Link to the station's page, when upstream provides one.
    pub url: Option<String>,

    pub lat: f32,
    pub lon: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_hash_prefix() {
        assert_eq!(StationId::new(123).to_string(), "#123");
    }

    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&StationId::new(7)).unwrap();
        assert_eq!(json, "7");

        let id: StationId = serde_json::from_str("42").unwrap();
        assert_eq!(id.get(), 42);
    }
}
