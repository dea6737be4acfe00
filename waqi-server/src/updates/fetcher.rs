//! Per-station polling.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{Span, debug, info, warn};

use crate::domain::{StationId, Status};
use crate::waqi::StatusSource;

use super::listener::Listener;

/// What a single refresh did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The lookup failed; nothing changed.
    Failed,
    /// First successful lookup; stored without notifying.
    Baseline,
    /// Same measurement as before; nobody notified.
    Unchanged,
    /// New measurement delivered to this many listeners (failures included).
    Changed { notified: usize },
}

struct FetcherState {
    listeners: Vec<Arc<dyn Listener>>,
    last: Option<Status>,
}

/// Tracks one station and notifies its listeners when the measurement
/// changes.
///
/// The lookup itself runs without the lock, so subscribe and unsubscribe are
/// never stuck behind a slow upstream. Comparison, storing and delivery all
/// happen under the lock, which means a listener that has been removed never
/// receives a late update.
///
/// Overlapping refreshes of the same fetcher (e.g. `update_once` during a
/// background tick) are not ordered: the lookup that finishes last wins, even
/// if it started first, and may be reported as a change back to older data.
pub struct StationFetcher<S> {
    station_id: StationId,
    source: Arc<S>,
    state: Mutex<FetcherState>,
    span: Span,
}

impl<S: StatusSource> StationFetcher<S> {
    /// Create a fetcher and run its first refresh before returning, so the
    /// baseline is in place before anyone can subscribe.
    pub async fn new(station_id: StationId, source: Arc<S>, span: Span) -> Self {
        let fetcher = Self {
            station_id,
            source,
            state: Mutex::new(FetcherState {
                listeners: Vec::new(),
                last: None,
            }),
            span,
        };
        fetcher.refresh().await;
        fetcher
    }

    /// Add a listener at the end of the list.
    pub async fn subscribe(&self, listener: Arc<dyn Listener>) {
        self.state.lock().await.listeners.push(listener);
    }

    /// Remove the first occurrence of `listener` (by identity).
    ///
    /// Returns whether it was found.
    pub async fn unsubscribe(&self, listener: &Arc<dyn Listener>) -> bool {
        let mut state = self.state.lock().await;
        match state
            .listeners
            .iter()
            .position(|l| Arc::ptr_eq(l, listener))
        {
            Some(index) => {
                state.listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.listeners.is_empty()
    }

    pub async fn listener_count(&self) -> usize {
        self.state.lock().await.listeners.len()
    }

    /// Most recent successfully fetched measurement.
    pub async fn last_status(&self) -> Option<Status> {
        self.state.lock().await.last.clone()
    }

    /// Fetch the current measurement and notify listeners if it changed.
    pub async fn refresh(&self) -> RefreshOutcome {
        let status = match self.source.by_station(self.station_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(parent: &self.span, station = %self.station_id, error = %e, "unable to get station data");
                return RefreshOutcome::Failed;
            }
        };

        let mut state = self.state.lock().await;
        let outcome = match &state.last {
            None => {
                debug!(parent: &self.span, station = %self.station_id, aqi = status.aqi, "baseline established");
                RefreshOutcome::Baseline
            }
            Some(previous) if *previous == status => RefreshOutcome::Unchanged,
            Some(previous) => {
                info!(
                    parent: &self.span,
                    station = %self.station_id,
                    level = %status.level,
                    previous_level = %previous.level,
                    listeners = state.listeners.len(),
                    "station data updated"
                );
                for listener in &state.listeners {
                    if let Err(e) = listener.on_update(&status, Some(previous)) {
                        warn!(parent: &self.span, station = %self.station_id, error = %e, "unable to push update to listener");
                    }
                }
                RefreshOutcome::Changed {
                    notified: state.listeners.len(),
                }
            }
        };
        state.last = Some(status);
        outcome
    }
}

#[cfg(test)]
pub(crate) mod recorder {
    use std::sync::Mutex;

    use super::*;
    use crate::updates::ListenerError;

    /// Listener that records `(new aqi, previous aqi)` pairs.
    #[derive(Default)]
    pub struct Recorder {
        pub seen: Mutex<Vec<(f32, Option<f32>)>>,
        pub fail: bool,
    }

    impl Recorder {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                ..Self::default()
            })
        }

        pub fn seen(&self) -> Vec<(f32, Option<f32>)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Listener for Recorder {
        fn on_update(&self, status: &Status, previous: Option<&Status>) -> Result<(), ListenerError> {
            self.seen
                .lock()
                .unwrap()
                .push((status.aqi, previous.map(|p| p.aqi)));
            if self.fail {
                Err(ListenerError::Rejected("boom".into()))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::recorder::Recorder;
    use super::*;
    use crate::domain::fixtures::status;
    use crate::updates::ListenerError;
    use crate::waqi::{MockReply, MockWaqiClient};

    const ID: StationId = StationId::new(123);

    async fn fetcher(mock: &MockWaqiClient) -> StationFetcher<MockWaqiClient> {
        StationFetcher::new(ID, Arc::new(mock.clone()), Span::none()).await
    }

    #[tokio::test]
    async fn construction_establishes_baseline_silently() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(123, 40.0)).await;

        let f = fetcher(&mock).await;
        let l = Recorder::new();
        f.subscribe(l.clone()).await;

        assert_eq!(mock.calls_for(ID).await, 1);
        assert_eq!(f.last_status().await.map(|s| s.aqi), Some(40.0));
        assert!(l.seen().is_empty());
    }

    #[tokio::test]
    async fn first_success_after_failures_is_silent() {
        let mock = MockWaqiClient::new();
        mock.set_reply(ID, MockReply::Transport("down".into()))
            .await;
        let f = fetcher(&mock).await;
        let l = Recorder::new();
        f.subscribe(l.clone()).await;
        assert!(f.last_status().await.is_none());

        mock.set_status(status(123, 40.0)).await;
        assert_eq!(f.refresh().await, RefreshOutcome::Baseline);
        assert!(l.seen().is_empty());
    }

    #[tokio::test]
    async fn change_is_pushed_with_previous() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(123, 40.0)).await;
        let f = fetcher(&mock).await;
        let l = Recorder::new();
        f.subscribe(l.clone()).await;

        mock.set_status(status(123, 60.0)).await;
        assert_eq!(f.refresh().await, RefreshOutcome::Changed { notified: 1 });
        assert_eq!(l.seen(), vec![(60.0, Some(40.0))]);

        assert_eq!(f.refresh().await, RefreshOutcome::Unchanged);
        assert_eq!(l.seen().len(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_status() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(123, 60.0)).await;
        let f = fetcher(&mock).await;
        let l = Recorder::new();
        f.subscribe(l.clone()).await;

        mock.set_reply(ID, MockReply::Upstream("Unknown station".into()))
            .await;
        assert_eq!(f.refresh().await, RefreshOutcome::Failed);

        assert_eq!(f.last_status().await.map(|s| s.aqi), Some(60.0));
        assert!(l.seen().is_empty());
    }

    #[tokio::test]
    async fn failing_listener_does_not_stop_delivery() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(123, 40.0)).await;
        let f = fetcher(&mock).await;
        let bad = Recorder::failing();
        let good = Recorder::new();
        f.subscribe(bad.clone()).await;
        f.subscribe(good.clone()).await;

        mock.set_status(status(123, 160.0)).await;
        assert_eq!(f.refresh().await, RefreshOutcome::Changed { notified: 2 });

        assert_eq!(bad.seen().len(), 1);
        assert_eq!(good.seen(), vec![(160.0, Some(40.0))]);
        assert_eq!(f.listener_count().await, 2);
        assert_eq!(f.last_status().await.map(|s| s.aqi), Some(160.0));
    }

    #[tokio::test]
    async fn delivery_follows_subscription_order() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(123, 40.0)).await;
        let f = fetcher(&mock).await;

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            let listener: Arc<dyn Listener> = Arc::new(move |_: &Status, _: Option<&Status>| {
                order.lock().unwrap().push(name);
                Ok::<(), ListenerError>(())
            });
            f.subscribe(listener).await;
        }

        mock.set_status(status(123, 60.0)).await;
        f.refresh().await;
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unsubscribe_removes_first_match_and_keeps_order() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(123, 40.0)).await;
        let f = fetcher(&mock).await;

        let a: Arc<dyn Listener> = Recorder::new();
        let b: Arc<dyn Listener> = Recorder::new();
        let c: Arc<dyn Listener> = Recorder::new();
        for l in [&a, &b, &a, &c] {
            f.subscribe(Arc::clone(l)).await;
        }

        assert!(f.unsubscribe(&a).await);
        {
            let state = f.state.lock().await;
            let remaining: Vec<_> = state.listeners.iter().collect();
            assert_eq!(remaining.len(), 3);
            assert!(Arc::ptr_eq(remaining[0], &b));
            assert!(Arc::ptr_eq(remaining[1], &a));
            assert!(Arc::ptr_eq(remaining[2], &c));
        }

        let stranger: Arc<dyn Listener> = Recorder::new();
        assert!(!f.unsubscribe(&stranger).await);
        assert_eq!(f.listener_count().await, 3);
    }

    #[tokio::test]
    async fn removed_listener_gets_nothing() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(123, 40.0)).await;
        let f = fetcher(&mock).await;
        let l = Recorder::new();
        let handle: Arc<dyn Listener> = l.clone();
        f.subscribe(handle.clone()).await;
        f.unsubscribe(&handle).await;
        assert!(f.is_empty().await);

        mock.set_status(status(123, 60.0)).await;
        assert_eq!(f.refresh().await, RefreshOutcome::Changed { notified: 0 });
        assert!(l.seen().is_empty());
    }
}
