use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by bucketing, historical queries and live subscriptions
#[derive(Debug, Error)]
pub enum OhlcvError {
    #[error("Invalid bucket unit: '{unit}'. Valid options: sec, min, hour, day, week, month, year")]
    InvalidUnit { unit: String },

    #[error("Invalid bucket duration: {duration} (must be at least 1)")]
    InvalidDuration { duration: i64 },

    #[error("Invalid time range: end {end} must be after start {start}")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Timestamp out of range: {reason}")]
    InvalidTimestamp { reason: String },

    #[error("Trade store unavailable: {0}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("Trade store did not answer within {timeout_ms}ms")]
    StoreTimeout { timeout_ms: u64 },

    #[error("Unable to subscribe: {reason}")]
    SubscriptionError { reason: String },

    #[error("Late trade {hash} for {channel}: bucket {bucket_start} precedes open bucket {open_start}")]
    LateTrade {
        hash: String,
        channel: String,
        bucket_start: DateTime<Utc>,
        open_start: DateTime<Utc>,
    },
}

impl OhlcvError {
    /// Stable machine-readable code, sent in push-path error notifications
    pub fn code(&self) -> &'static str {
        match self {
            OhlcvError::InvalidUnit { .. } => "INVALID_UNIT",
            OhlcvError::InvalidDuration { .. } => "INVALID_DURATION",
            OhlcvError::InvalidTimeRange { .. } => "INVALID_TIME_RANGE",
            OhlcvError::InvalidTimestamp { .. } => "INVALID_TIMESTAMP",
            OhlcvError::StoreUnavailable(_) | OhlcvError::StoreTimeout { .. } => {
                "STORE_UNAVAILABLE"
            }
            OhlcvError::SubscriptionError { .. } => "UNABLE_TO_SUBSCRIBE",
            OhlcvError::LateTrade { .. } => "LATE_TRADE",
        }
    }

    /// Whether the caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OhlcvError::StoreUnavailable(_) | OhlcvError::StoreTimeout { .. }
        )
    }
}
