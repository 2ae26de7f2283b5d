use crate::application::market_data::candle_aggregator::CandleAggregator;
use crate::domain::errors::OhlcvError;
use crate::domain::market::bucket::BucketSpec;
use crate::domain::market::trade_filter::{TimeRange, TradeFilter};
use crate::domain::ports::TradeStore;
use crate::domain::trading::types::{Candle, Pair};
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Answers bounded-range candle queries against the trade store.
///
/// Holds no per-query state, so a caller may drop the returned future at any
/// point without side effects.
#[derive(Clone)]
pub struct HistoricalQueryEngine {
    store: Arc<dyn TradeStore>,
    timeout: Duration,
    metrics: Option<Metrics>,
}

impl HistoricalQueryEngine {
    pub fn new(store: Arc<dyn TradeStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Candles for `pairs` (all pairs when empty) over `range`, or over the
    /// latest bucket window when no range is given
    pub async fn query(
        &self,
        pairs: &[Pair],
        spec: BucketSpec,
        range: Option<TimeRange>,
    ) -> Result<Vec<Candle>, OhlcvError> {
        self.query_at(Utc::now(), pairs, spec, range).await
    }

    /// Same as [`query`](Self::query) with an explicit notion of "now"
    pub async fn query_at(
        &self,
        now: DateTime<Utc>,
        pairs: &[Pair],
        spec: BucketSpec,
        range: Option<TimeRange>,
    ) -> Result<Vec<Candle>, OhlcvError> {
        let started = Instant::now();
        let result = self.run(now, pairs, spec, range).await;

        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(e) => e.code(),
            };
            metrics.inc_queries(outcome);
            metrics.observe_query_latency(spec.unit.as_str(), started.elapsed().as_secs_f64());
        }

        result
    }

    async fn run(
        &self,
        now: DateTime<Utc>,
        pairs: &[Pair],
        spec: BucketSpec,
        range: Option<TimeRange>,
    ) -> Result<Vec<Candle>, OhlcvError> {
        let range = match range {
            Some(range) => range,
            None => TimeRange::latest(now, spec)?,
        };
        let filter = TradeFilter::build_predicate(range, pairs);

        let trades = match tokio::time::timeout(self.timeout, self.store.find_trades(&filter)).await
        {
            Ok(Ok(trades)) => trades,
            Ok(Err(e)) => {
                warn!("HistoricalQueryEngine: trade store failed: {:#}", e);
                return Err(OhlcvError::StoreUnavailable(e));
            }
            Err(_) => {
                warn!(
                    "HistoricalQueryEngine: trade store timed out after {:?}",
                    self.timeout
                );
                return Err(OhlcvError::StoreTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        let candles = CandleAggregator::new(spec).aggregate(&trades)?;

        debug!(
            "HistoricalQueryEngine: {} pairs, {} [{} .. {}) -> {} candles",
            pairs.len(),
            spec,
            range.start,
            range.end,
            candles.len()
        );

        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::bucket_unit::BucketUnit;
    use crate::domain::trading::types::{Trade, TradeStatus};
    use crate::infrastructure::repositories::InMemoryTradeStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    struct FailingStore;

    #[async_trait]
    impl TradeStore for FailingStore {
        async fn find_trades(&self, _filter: &TradeFilter) -> Result<Vec<Trade>> {
            anyhow::bail!("connection reset by peer")
        }

        async fn save(&self, _trade: &Trade) -> Result<()> {
            Ok(())
        }
    }

    struct StalledStore;

    #[async_trait]
    impl TradeStore for StalledStore {
        async fn find_trades(&self, _filter: &TradeFilter) -> Result<Vec<Trade>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn save(&self, _trade: &Trade) -> Result<()> {
            Ok(())
        }
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    fn trade(hash: &str, pair: &Pair, price: rust_decimal::Decimal, ts: DateTime<Utc>) -> Trade {
        Trade {
            hash: hash.to_string(),
            pair: pair.clone(),
            price,
            amount: dec!(1),
            status: TradeStatus::Success,
            created_at: ts,
        }
    }

    fn minutes(n: i64) -> BucketSpec {
        BucketSpec::new(n, BucketUnit::Minute).unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_returns_empty_list() {
        let engine = HistoricalQueryEngine::new(
            Arc::new(InMemoryTradeStore::new()),
            Duration::from_secs(1),
        );

        let candles = engine
            .query_at(utc(12, 0, 0), &[], minutes(1), None)
            .await
            .unwrap();
        assert!(candles.is_empty());
    }

    #[tokio::test]
    async fn test_default_range_covers_current_and_previous_bucket() {
        let store = Arc::new(InMemoryTradeStore::new());
        let pair = Pair::new("WETH", "DAI");
        for t in [
            trade("old", &pair, dec!(1), utc(11, 54, 59)),
            trade("prev", &pair, dec!(2), utc(11, 55, 10)),
            trade("cur", &pair, dec!(3), utc(12, 1, 0)),
        ] {
            store.save(&t).await.unwrap();
        }

        let engine = HistoricalQueryEngine::new(store, Duration::from_secs(1));
        let candles = engine
            .query_at(utc(12, 2, 0), &[pair], minutes(5), None)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, dec!(2));
        assert_eq!(candles[1].open, dec!(3));
    }

    #[tokio::test]
    async fn test_explicit_range_overrides_default() {
        let store = Arc::new(InMemoryTradeStore::new());
        let pair = Pair::new("WETH", "DAI");
        store.save(&trade("a", &pair, dec!(5), utc(1, 0, 0))).await.unwrap();
        store.save(&trade("b", &pair, dec!(6), utc(2, 30, 0))).await.unwrap();

        let engine = HistoricalQueryEngine::new(store, Duration::from_secs(1));
        let range = TimeRange::new(utc(0, 0, 0), utc(2, 0, 0)).unwrap();
        let candles = engine
            .query_at(utc(12, 0, 0), &[], BucketSpec::new(1, BucketUnit::Hour).unwrap(), Some(range))
            .await
            .unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, dec!(5));
    }

    #[tokio::test]
    async fn test_store_failure_is_propagated() {
        let metrics = Metrics::new().unwrap();
        let engine = HistoricalQueryEngine::new(Arc::new(FailingStore), Duration::from_secs(1))
            .with_metrics(metrics.clone());

        let err = engine
            .query_at(utc(12, 0, 0), &[], minutes(1), None)
            .await
            .unwrap_err();

        assert!(matches!(err, OhlcvError::StoreUnavailable(_)));
        assert!(err.to_string().contains("connection reset by peer"));
        assert!(metrics.render().contains("STORE_UNAVAILABLE"));
    }

    #[tokio::test]
    async fn test_store_call_is_bounded_by_timeout() {
        let engine =
            HistoricalQueryEngine::new(Arc::new(StalledStore), Duration::from_millis(50));

        let started = Instant::now();
        let err = engine
            .query_at(utc(12, 0, 0), &[], minutes(1), None)
            .await
            .unwrap_err();

        assert!(matches!(err, OhlcvError::StoreTimeout { timeout_ms: 50 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
