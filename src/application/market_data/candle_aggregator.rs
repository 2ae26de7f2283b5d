use crate::domain::errors::OhlcvError;
use crate::domain::market::bucket::{BucketKey, BucketSpec};
use crate::domain::trading::types::{Candle, Pair, Trade};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Running OHLCV state for one bucket
#[derive(Debug, Clone, PartialEq)]
pub struct CandleBuilder {
    pair: Pair,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    start_time: DateTime<Utc>,
    count: u64,
}

impl CandleBuilder {
    /// Open a bucket with its first trade
    pub fn new(pair: Pair, start_time: DateTime<Utc>, price: Decimal, amount: Decimal) -> Self {
        Self {
            pair,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: amount,
            start_time,
            count: 1,
        }
    }

    /// Resume from an already emitted candle
    pub fn from_candle(candle: &Candle) -> Option<Self> {
        Some(Self {
            pair: candle.pair.clone(),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            start_time: candle.bucket_start()?,
            count: candle.count,
        })
    }

    pub fn update(&mut self, price: Decimal, amount: Decimal) {
        self.count += 1;

        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume += amount;
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn build(&self) -> Candle {
        Candle {
            pair: self.pair.clone(),
            timestamp: self.start_time.timestamp_millis(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            count: self.count,
        }
    }
}

/// Folds an ordered trade sequence into one candle per populated bucket
pub struct CandleAggregator {
    spec: BucketSpec,
}

impl CandleAggregator {
    pub fn new(spec: BucketSpec) -> Self {
        Self { spec }
    }

    /// Aggregate `trades` into candles sorted by bucket start.
    ///
    /// Trades are scanned by `created_at`; equal timestamps keep their input
    /// order, which decides open and close. Buckets without trades are not
    /// materialized.
    pub fn aggregate(&self, trades: &[Trade]) -> Result<Vec<Candle>, OhlcvError> {
        let mut ordered: Vec<&Trade> = trades.iter().collect();
        ordered.sort_by_key(|t| t.created_at);

        let mut index: HashMap<BucketKey, usize> = HashMap::new();
        let mut builders: Vec<CandleBuilder> = Vec::new();

        for trade in ordered {
            let key = BucketKey::for_trade(trade, self.spec)?;

            match index.get(&key) {
                Some(&slot) => builders[slot].update(trade.price, trade.amount),
                None => {
                    let builder =
                        CandleBuilder::new(key.pair.clone(), key.start, trade.price, trade.amount);
                    index.insert(key, builders.len());
                    builders.push(builder);
                }
            }
        }

        builders.sort_by_key(|b| b.start_time);

        debug!(
            "CandleAggregator: {} trades -> {} candles ({})",
            trades.len(),
            builders.len(),
            self.spec
        );

        Ok(builders.iter().map(CandleBuilder::build).collect())
    }
}

/// Aggregate `trades` into candles of `spec` buckets
pub fn aggregate(trades: &[Trade], spec: BucketSpec) -> Result<Vec<Candle>, OhlcvError> {
    CandleAggregator::new(spec).aggregate(trades)
}
