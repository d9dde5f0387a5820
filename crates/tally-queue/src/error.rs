//! # Queue Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Where each failure surfaces                                            │
//! │                                                                         │
//! │  submit() after shutdown        → Err(QueueError::ServiceStopped)       │
//! │  put interrupted while waiting  → Ok(ticket) already failed             │
//! │  business / persistence error   → Ok(ticket) → BillOutcome::Failure     │
//! │  caller gave up waiting         → adapter: SubmissionResponse::Processing│
//! │  bad configuration              → Err(QueueError::Config)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Why a blocking channel operation returned without an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel has been closed; no more items will flow.
    #[error("channel closed")]
    Closed,

    /// The wait was cancelled before it completed.
    #[error("interrupted while waiting")]
    Interrupted,
}

/// A failed put. The item is handed back untouched.
pub struct PutError<T> {
    pub reason: ChannelError,
    pub item: T,
}

impl<T> PutError<T> {
    pub(crate) fn new(reason: ChannelError, item: T) -> Self {
        PutError { reason, item }
    }

    /// Returns the item that was not enqueued.
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> std::fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> std::fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "put failed: {}", self.reason)
    }
}

impl<T> std::error::Error for PutError<T> {}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    /// A setting is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// TOML could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Queue service errors returned synchronously to the submitter.
#[derive(Debug, Error)]
pub enum QueueError {
    /// `submit` was called after `shutdown`.
    #[error("Bill queue service is stopped")]
    ServiceStopped,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_error_returns_item() {
        let err = PutError::new(ChannelError::Interrupted, "bill-42");
        assert_eq!(err.to_string(), "put failed: interrupted while waiting");
        assert_eq!(err.into_inner(), "bill-42");
    }

    #[test]
    fn test_toml_error_maps_to_parse() {
        let err: ConfigError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
