//! Background updates and change notification.
//!
//! `UpdateScheduler` keeps one `StationFetcher` per subscribed station and
//! refreshes all of them on a fixed period. A fetcher remembers the last
//! measurement it saw and pushes `(new, previous)` to its listeners only
//! when the next one differs. The very first measurement of a fetcher is
//! a baseline and is never pushed.

mod fetcher;
mod listener;
mod scheduler;

pub use fetcher::{RefreshOutcome, StationFetcher};
pub use listener::{ChannelListener, Listener, ListenerError, StatusUpdate};
pub use scheduler::{DEFAULT_POLL_PERIOD, UpdateScheduler};
