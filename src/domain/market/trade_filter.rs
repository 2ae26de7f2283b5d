use crate::domain::errors::OhlcvError;
use crate::domain::market::bucket::BucketSpec;
use crate::domain::trading::types::{Pair, Trade, TradeStatus};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Half-open time interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, OhlcvError> {
        if end <= start {
            return Err(OhlcvError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build a range from epoch milliseconds
    pub fn from_millis(start_ms: i64, end_ms: i64) -> Result<Self, OhlcvError> {
        let to_utc = |ms: i64| {
            Utc.timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| OhlcvError::InvalidTimestamp {
                    reason: format!("{}ms is not a representable instant", ms),
                })
        };
        Self::new(to_utc(start_ms)?, to_utc(end_ms)?)
    }

    /// Default query window: from one bucket width before the bucket holding
    /// `now`, up to `now`
    pub fn latest(now: DateTime<Utc>, spec: BucketSpec) -> Result<Self, OhlcvError> {
        let boundary = spec.align(now)?;
        let start = boundary.start - Duration::seconds(boundary.width_seconds);
        Self::new(start, now)
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Inclusion predicate applied to trades before aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFilter {
    pub status: TradeStatus,
    pub range: TimeRange,
    /// Empty means every pair
    pub pairs: Vec<Pair>,
}

impl TradeFilter {
    /// Successful trades inside `range` whose pair is one of `pairs`
    pub fn build_predicate(range: TimeRange, pairs: &[Pair]) -> Self {
        Self {
            status: TradeStatus::Success,
            range,
            pairs: pairs.to_vec(),
        }
    }

    pub fn matches(&self, trade: &Trade) -> bool {
        trade.status == self.status
            && self.range.contains(trade.created_at)
            && (self.pairs.is_empty() || self.pairs.contains(&trade.pair))
    }
}
