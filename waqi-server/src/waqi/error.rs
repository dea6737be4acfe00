//! WAQI client error types.

use crate::cache::StoreError;

/// Errors from looking up a measurement.
///
/// Every variant reaches the caller of an on-demand query unchanged; the
/// background updater logs them and keeps its previous state.
#[derive(Debug, thiserror::Error)]
pub enum WaqiError {
    /// Upstream could not be reached (connection, timeout, broken body).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Upstream answered but reported a failure, either through a non-2xx
    /// HTTP status or a `"status": "error"` payload.
    #[error("upstream error: {message}")]
    Upstream { message: String },

    /// The payload could not be parsed into a measurement.
    #[error("malformed data: {message}")]
    MalformedData {
        message: String,
        body: Option<String>,
    },

    /// The local cache store failed.
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),

    /// The client was configured with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl WaqiError {
    pub fn upstream(message: impl Into<String>) -> Self {
        WaqiError::Upstream {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        let message: String = message.into();
        WaqiError::Transport(message.into())
    }
}

impl From<reqwest::Error> for WaqiError {
    fn from(err: reqwest::Error) -> Self {
        WaqiError::Transport(Box::new(err))
    }
}
