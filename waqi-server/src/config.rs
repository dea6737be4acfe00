//! Process configuration from the environment.
//!
//! Variables may also come from a `.env` file in the working directory;
//! real environment variables take precedence.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::domain::StationId;
use crate::service::ServiceConfig;
use crate::waqi::{DEFAULT_BASE_URL, WaqiConfig};

/// Default listen address for the HTTP endpoint.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Default location of the cache store.
pub const DEFAULT_CACHE_PATH: &str = "data/waqi-cache.sqlite3";

/// Invalid environment variable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Everything the server binary needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub listen_addr: SocketAddr,

    /// Stations to subscribe to at startup (`WAQI_WATCH_STATIONS`).
    pub watch_stations: Vec<StationId>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `get`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| get(name).filter(|v| !v.trim().is_empty());

        let waqi = WaqiConfig::new(get("WAQI_TOKEN").unwrap_or_default())
            .with_base_url(get("WAQI_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()))
            .with_timeout(parse(&get, "WAQI_TIMEOUT_SECS", "a number of seconds")?.unwrap_or(30));

        let cache_path = get("WAQI_CACHE_PATH").unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string());
        let mut cache = CacheConfig::new(PathBuf::from(cache_path));
        if let Some(secs) = parse(&get, "WAQI_CACHE_TTL_SECS", "a number of seconds")? {
            cache = cache.with_ttl(Duration::from_secs(secs));
        }

        let mut service = ServiceConfig::new(waqi.token.clone())
            .with_waqi(waqi)
            .with_cache(cache);
        if let Some(secs) = parse::<u64>(&get, "WAQI_POLL_INTERVAL_SECS", "a number of seconds")? {
            if secs == 0 {
                return Err(ConfigError {
                    name: "WAQI_POLL_INTERVAL_SECS",
                    expected: "greater than zero",
                    value: secs.to_string(),
                });
            }
            service = service.with_poll_period(Duration::from_secs(secs));
        }

        let listen_addr = parse(&get, "LISTEN_ADDR", "a socket address")?
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8000)));

        let watch_stations = match get("WAQI_WATCH_STATIONS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>().map(StationId::new).map_err(|_| ConfigError {
                        name: "WAQI_WATCH_STATIONS",
                        expected: "a comma-separated list of station ids",
                        value: list.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            service,
            listen_addr,
            watch_stations,
        })
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    get(name)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError {
                name,
                expected,
                value,
            })
        })
        .transpose()
}
