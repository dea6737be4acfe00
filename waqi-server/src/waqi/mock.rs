//! Mock WAQI client for testing without API access.
//!
//! Replies are scripted per station; city and coordinate lookups resolve to
//! a station through registered aliases. Every lookup is counted so tests
//! can assert how often "upstream" was hit.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{StationId, Status};

use super::convert::decode_feed;
use super::error::WaqiError;
use super::source::StatusSource;

/// What the mock answers for a station.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// A ready measurement.
    Status(Status),
    /// A raw feed body, decoded like a real response.
    Body(String),
    /// A transport failure with this message.
    Transport(String),
    /// An upstream failure with this message.
    Upstream(String),
}

#[derive(Default)]
struct MockState {
    replies: HashMap<StationId, MockReply>,
    cities: HashMap<String, StationId>,
    geo: HashMap<(i64, i64), StationId>,
    calls: HashMap<StationId, usize>,
    total_calls: usize,
    latency: Option<Duration>,
}

/// Scriptable in-memory `StatusSource`.
#[derive(Clone, Default)]
pub struct MockWaqiClient {
    state: Arc<Mutex<MockState>>,
    closed: Arc<AtomicBool>,
}

impl MockWaqiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer lookups of `id` with `reply` from now on.
    pub async fn set_reply(&self, id: StationId, reply: MockReply) {
        self.state.lock().await.replies.insert(id, reply);
    }

    /// Shorthand for `set_reply(status.station.id, MockReply::Status(status))`.
    pub async fn set_status(&self, status: Status) {
        self.set_reply(status.station.id, MockReply::Status(status))
            .await;
    }

    /// Resolve `by_city(name)` (case-insensitive) to `id`.
    pub async fn add_city(&self, name: &str, id: StationId) {
        self.state
            .lock()
            .await
            .cities
            .insert(name.to_lowercase(), id);
    }

    /// Resolve `by_geo` within 0.01 degrees of `(lat, lon)` to `id`.
    pub async fn add_geo(&self, lat: f32, lon: f32, id: StationId) {
        self.state.lock().await.geo.insert(grid(lat, lon), id);
    }

    /// Delay every reply, simulating a slow upstream.
    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = Some(latency);
    }

    /// Number of lookups answered for `id` (by any addressing scheme).
    pub async fn calls_for(&self, id: StationId) -> usize {
        self.state
            .lock()
            .await
            .calls
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of lookups, including unresolved ones.
    pub async fn total_calls(&self) -> usize {
        self.state.lock().await.total_calls
    }

    pub async fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn answer(
        &self,
        resolve: impl FnOnce(&MockState) -> Option<StationId> + Send,
    ) -> Result<Status, WaqiError> {
        let (reply, latency) = {
            let mut state = self.state.lock().await;
            state.total_calls += 1;
            let reply = match resolve(&*state) {
                Some(id) => {
                    *state.calls.entry(id).or_default() += 1;
                    state.replies.get(&id).cloned()
                }
                None => None,
            };
            (reply, state.latency)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match reply {
            Some(MockReply::Status(status)) => Ok(status),
            Some(MockReply::Body(body)) => decode_feed(&body, Utc::now()),
            Some(MockReply::Transport(message)) => Err(WaqiError::transport(message)),
            Some(MockReply::Upstream(message)) => Err(WaqiError::upstream(message)),
            None => Err(WaqiError::upstream("Unknown station")),
        }
    }
}

fn grid(lat: f32, lon: f32) -> (i64, i64) {
    ((lat * 100.0).round() as i64, (lon * 100.0).round() as i64)
}

impl StatusSource for MockWaqiClient {
    async fn by_station(&self, id: StationId) -> Result<Status, WaqiError> {
        self.answer(|_| Some(id)).await
    }

    async fn by_city(&self, city: &str) -> Result<Status, WaqiError> {
        let key = city.to_lowercase();
        self.answer(move |s| s.cities.get(&key).copied()).await
    }

    async fn by_geo(&self, lat: f32, lon: f32) -> Result<Status, WaqiError> {
        self.answer(move |s| s.geo.get(&grid(lat, lon)).copied())
            .await
    }

    fn close(&self) -> Result<(), WaqiError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
