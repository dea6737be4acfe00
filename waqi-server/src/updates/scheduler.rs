//! Periodic refresh of all subscribed stations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Span, debug, info, warn};

use crate::domain::StationId;
use crate::waqi::StatusSource;

use super::fetcher::StationFetcher;
use super::listener::Listener;

/// How often subscribed stations are refreshed by default (10 minutes).
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(10 * 60);

type FetcherMap<S> = HashMap<StationId, Arc<StationFetcher<S>>>;

struct Worker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns one `StationFetcher` per subscribed station and refreshes them on
/// a fixed period.
///
/// A station is in the map exactly as long as it has at least one listener.
pub struct UpdateScheduler<S> {
    source: Arc<S>,
    fetchers: Arc<Mutex<FetcherMap<S>>>,
    period: Duration,
    worker: Mutex<Option<Worker>>,
    span: Span,
}

impl<S: StatusSource> UpdateScheduler<S> {
    pub fn new(source: Arc<S>, period: Duration, span: Span) -> Self {
        Self {
            source,
            fetchers: Arc::new(Mutex::new(HashMap::new())),
            period,
            worker: Mutex::new(None),
            span,
        }
    }

    /// Add `listener` to `station`, creating its fetcher if needed.
    ///
    /// Creating a fetcher performs its first lookup while the map is locked,
    /// so this can take as long as one upstream request.
    pub async fn subscribe(&self, station: StationId, listener: Arc<dyn Listener>) {
        let mut fetchers = self.fetchers.lock().await;

        let fetcher = match fetchers.get(&station) {
            Some(fetcher) => Arc::clone(fetcher),
            None => {
                let fetcher = Arc::new(
                    StationFetcher::new(station, Arc::clone(&self.source), self.span.clone())
                        .await,
                );
                fetchers.insert(station, Arc::clone(&fetcher));
                info!(parent: &self.span, %station, "subscribed to station");
                fetcher
            }
        };

        fetcher.subscribe(listener).await;
    }

    /// Remove `listener` from `station`. Unknown stations are ignored.
    pub async fn unsubscribe(&self, station: StationId, listener: &Arc<dyn Listener>) {
        let mut fetchers = self.fetchers.lock().await;

        let Some(fetcher) = fetchers.get(&station) else {
            return;
        };

        fetcher.unsubscribe(listener).await;
        if fetcher.is_empty().await {
            fetchers.remove(&station);
            info!(parent: &self.span, %station, "unsubscribed from station");
        }
    }

    /// Stations that currently have listeners, in ascending order.
    pub async fn subscribed_stations(&self) -> Vec<StationId> {
        let mut stations: Vec<_> = self.fetchers.lock().await.keys().copied().collect();
        stations.sort();
        stations
    }

    /// The fetcher tracking `station`, if subscribed.
    pub async fn fetcher(&self, station: StationId) -> Option<Arc<StationFetcher<S>>> {
        self.fetchers.lock().await.get(&station).cloned()
    }

    /// Refresh every subscribed station once, right now.
    pub async fn update_once(&self) {
        refresh_all(&self.fetchers, &self.span).await;
    }

    /// Start the background refresh loop. Does nothing if already running.
    ///
    /// The first refresh happens one period from now.
    pub async fn start_updates(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }

        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(update_loop(
            Arc::clone(&self.fetchers),
            self.period,
            stop_rx,
            self.span.clone(),
        ));

        info!(parent: &self.span, period = ?self.period, "starting background updates");
        *worker = Some(Worker { stop, handle });
    }

    /// Stop the background loop and wait for it to exit. Does nothing if not
    /// running.
    ///
    /// A refresh in progress is allowed to finish.
    pub async fn stop_updates(&self) {
        let Some(Worker { stop, handle }) = self.worker.lock().await.take() else {
            return;
        };

        // The loop may already be gone if it panicked.
        let _ = stop.send(());
        if let Err(e) = handle.await {
            warn!(parent: &self.span, error = %e, "update loop ended abnormally");
        }
        info!(parent: &self.span, "background updates stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.worker.lock().await.is_some()
    }
}

async fn update_loop<S: StatusSource>(
    fetchers: Arc<Mutex<FetcherMap<S>>>,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
    span: Span,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Either an explicit stop or the scheduler being dropped.
            _ = &mut stop => break,
            _ = ticker.tick() => refresh_all(&fetchers, &span).await,
        }
    }

    debug!(parent: &span, "update loop exited");
}

/// Refresh a snapshot of the current fetchers, one after another.
///
/// The map is only locked while taking the snapshot; stations subscribed
/// meanwhile are picked up on the next call.
async fn refresh_all<S: StatusSource>(fetchers: &Mutex<FetcherMap<S>>, span: &Span) {
    let snapshot: Vec<_> = fetchers.lock().await.values().cloned().collect();
    debug!(parent: span, stations = snapshot.len(), "refreshing subscribed stations");

    for fetcher in snapshot {
        fetcher.refresh().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::status;
    use crate::updates::fetcher::recorder::Recorder;
    use crate::waqi::{MockReply, MockWaqiClient};

    const S1: StationId = StationId::new(1);
    const S2: StationId = StationId::new(2);

    fn scheduler(mock: &MockWaqiClient) -> UpdateScheduler<MockWaqiClient> {
        UpdateScheduler::new(Arc::new(mock.clone()), DEFAULT_POLL_PERIOD, Span::none())
    }

    #[tokio::test]
    async fn one_fetcher_per_station() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(1, 40.0)).await;
        let s = scheduler(&mock);

        let a: Arc<dyn Listener> = Recorder::new();
        let b: Arc<dyn Listener> = Recorder::new();
        s.subscribe(S1, a.clone()).await;
        s.subscribe(S1, b.clone()).await;

        assert_eq!(s.subscribed_stations().await, vec![S1]);
        assert_eq!(mock.calls_for(S1).await, 1);
        assert_eq!(s.fetcher(S1).await.unwrap().listener_count().await, 2);

        s.unsubscribe(S1, &a).await;
        assert_eq!(s.subscribed_stations().await, vec![S1]);

        s.unsubscribe(S1, &b).await;
        assert!(s.subscribed_stations().await.is_empty());
        assert!(s.fetcher(S1).await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_unknown_is_noop() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(1, 40.0)).await;
        let s = scheduler(&mock);
        let a: Arc<dyn Listener> = Recorder::new();
        let stranger: Arc<dyn Listener> = Recorder::new();

        s.unsubscribe(S2, &a).await;
        s.subscribe(S1, a.clone()).await;
        s.unsubscribe(S1, &stranger).await;

        assert_eq!(s.subscribed_stations().await, vec![S1]);
    }

    #[tokio::test]
    async fn resubscribing_creates_fresh_baseline() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(1, 40.0)).await;
        let s = scheduler(&mock);
        let l = Recorder::new();
        let handle: Arc<dyn Listener> = l.clone();

        s.subscribe(S1, handle.clone()).await;
        s.unsubscribe(S1, &handle).await;
        mock.set_status(status(1, 60.0)).await;
        s.subscribe(S1, handle.clone()).await;
        s.update_once().await;

        assert_eq!(mock.calls_for(S1).await, 3);
        assert!(l.seen().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let mock = MockWaqiClient::new();
        let id = StationId::new(123);
        mock.set_status(status(123, 40.0)).await;
        let s = scheduler(&mock);
        let l = Recorder::new();
        s.subscribe(id, l.clone()).await;

        // Tick 1: Good -> Moderate.
        mock.set_status(status(123, 60.0)).await;
        s.update_once().await;
        assert_eq!(l.seen(), vec![(60.0, Some(40.0))]);

        // Tick 2: unchanged.
        s.update_once().await;
        assert_eq!(l.seen().len(), 1);

        // Tick 3: upstream unreachable.
        mock.set_reply(id, MockReply::Transport("connection refused".into()))
            .await;
        s.update_once().await;
        assert_eq!(l.seen().len(), 1);

        let last = s.fetcher(id).await.unwrap().last_status().await.unwrap();
        assert_eq!(last.aqi, 60.0);
        assert_eq!(s.subscribed_stations().await, vec![id]);
    }

    #[tokio::test]
    async fn update_once_refreshes_every_station() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(1, 40.0)).await;
        mock.set_status(status(2, 40.0)).await;
        let s = scheduler(&mock);
        let l1 = Recorder::new();
        let l2 = Recorder::new();
        s.subscribe(S1, l1.clone()).await;
        s.subscribe(S2, l2.clone()).await;

        mock.set_status(status(1, 160.0)).await;
        mock.set_reply(S2, MockReply::Upstream("Unknown station".into()))
            .await;
        s.update_once().await;

        assert_eq!(l1.seen(), vec![(160.0, Some(40.0))]);
        assert!(l2.seen().is_empty());
        assert_eq!(mock.calls_for(S2).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_loop_ticks_on_period() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(1, 40.0)).await;
        let s = scheduler(&mock);
        let l = Recorder::new();
        s.subscribe(S1, l.clone()).await;

        s.start_updates().await;
        s.start_updates().await;
        assert!(s.is_running().await);

        mock.set_status(status(1, 60.0)).await;
        tokio::time::sleep(DEFAULT_POLL_PERIOD / 2).await;
        assert_eq!(mock.calls_for(S1).await, 1);

        tokio::time::sleep(DEFAULT_POLL_PERIOD / 2 + Duration::from_secs(1)).await;
        assert_eq!(mock.calls_for(S1).await, 2);
        assert_eq!(l.seen(), vec![(60.0, Some(40.0))]);

        tokio::time::sleep(DEFAULT_POLL_PERIOD).await;
        assert_eq!(mock.calls_for(S1).await, 3);

        s.stop_updates().await;
        s.stop_updates().await;
        assert!(!s.is_running().await);

        tokio::time::sleep(DEFAULT_POLL_PERIOD * 3).await;
        assert_eq!(mock.calls_for(S1).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop() {
        let mock = MockWaqiClient::new();
        mock.set_status(status(1, 40.0)).await;
        let s = scheduler(&mock);
        let l: Arc<dyn Listener> = Recorder::new();
        s.subscribe(S1, l).await;

        s.start_updates().await;
        s.stop_updates().await;
        s.start_updates().await;

        tokio::time::sleep(DEFAULT_POLL_PERIOD + Duration::from_secs(1)).await;
        assert_eq!(mock.calls_for(S1).await, 2);
        s.stop_updates().await;
    }
}
