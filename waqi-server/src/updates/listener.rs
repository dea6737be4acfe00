//! Receivers of station updates.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::{ReadingChange, Status};

/// Errors a listener can report back to the fetcher.
///
/// They are logged and otherwise ignored: the listener stays subscribed and
/// the other listeners still receive the update.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ListenerError {
    /// The receiving side has gone away
    #[error("listener disconnected")]
    Disconnected,

    /// The listener could not accept the update
    #[error("listener rejected update: {0}")]
    Rejected(String),
}

/// Receives a station's new measurement whenever it changes.
///
/// Called synchronously from the fetcher while its listener list is locked,
/// so implementations should hand the update off rather than do slow work.
pub trait Listener: Send + Sync {
    /// `previous` is the measurement the update replaces.
    fn on_update(&self, status: &Status, previous: Option<&Status>) -> Result<(), ListenerError>;
}

impl<F> Listener for F
where
    F: Fn(&Status, Option<&Status>) -> Result<(), ListenerError> + Send + Sync,
{
    fn on_update(&self, status: &Status, previous: Option<&Status>) -> Result<(), ListenerError> {
        self(status, previous)
    }
}

/// A delivered change, owned.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: Status,
    pub previous: Option<Status>,
}

impl StatusUpdate {
    /// Readings that differ from the previous measurement.
    pub fn changes(&self) -> Vec<ReadingChange> {
        self.previous
            .as_ref()
            .map(|prev| self.status.changes_since(prev))
            .unwrap_or_default()
    }
}

/// Listener that forwards updates onto a bounded channel.
///
/// This is the hand-off point for front-ends: the receiver drains updates at
/// its own pace while delivery never blocks. A full queue rejects the update.
#[derive(Debug)]
pub struct ChannelListener {
    tx: mpsc::Sender<StatusUpdate>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<StatusUpdate>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(Self { tx }), rx)
    }
}

impl Listener for ChannelListener {
    fn on_update(&self, status: &Status, previous: Option<&Status>) -> Result<(), ListenerError> {
        let update = StatusUpdate {
            status: status.clone(),
            previous: previous.cloned(),
        };
        self.tx.try_send(update).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ListenerError::Rejected("queue is full".into()),
            mpsc::error::TrySendError::Closed(_) => ListenerError::Disconnected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pollutant, fixtures::status};

    #[tokio::test]
    async fn channel_listener_forwards() {
        let (listener, mut rx) = ChannelListener::new(4);
        let prev = status(1, 40.0);
        let cur = status(1, 60.0);

        listener.on_update(&cur, Some(&prev)).unwrap();

        let update = rx.recv().await.unwrap();
        assert_eq!(update.status.aqi, 60.0);
        assert_eq!(update.previous.map(|p| p.aqi), Some(40.0));
    }

    #[test]
    fn channel_listener_reports_full_and_closed() {
        let (listener, rx) = ChannelListener::new(1);
        let s = status(1, 40.0);

        listener.on_update(&s, None).unwrap();
        assert!(matches!(
            listener.on_update(&s, None),
            Err(ListenerError::Rejected(_))
        ));

        drop(rx);
        assert!(matches!(
            listener.on_update(&s, None),
            Err(ListenerError::Disconnected)
        ));
    }

    #[test]
    fn closures_are_listeners() {
        let listener = |s: &Status, _: Option<&Status>| {
            if s.aqi > 100.0 {
                Err(ListenerError::Rejected("too high".into()))
            } else {
                Ok(())
            }
        };
        assert!(listener.on_update(&status(1, 40.0), None).is_ok());
        assert!(listener.on_update(&status(1, 140.0), None).is_err());
    }

    #[test]
    fn update_changes() {
        let update = StatusUpdate {
            status: status(1, 60.0),
            previous: Some(status(1, 40.0)),
        };
        let changes = update.changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].pollutant, Pollutant::Aqi);

        let first = StatusUpdate {
            status: status(1, 60.0),
            previous: None,
        };
        assert!(first.changes().is_empty());
    }
}
