//! In-Memory Trade Store
//!
//! Thread-safe, in-memory implementation of the `TradeStore` port.
//!
//! # Features
//!
//! - **Thread-safe**: Uses `Arc<RwLock>` for concurrent access
//! - **Ordered**: Results are sorted by creation time, insertion order on ties
//! - **Unique**: Hashes are indexed, so duplicate detection is O(1)
//! - **Testing**: Ideal for unit tests and development
//!
//! # Limitations
//!
//! - Data is lost on application restart
//! - Every query scans the whole trade list
//!
//! For persistence, use `SqliteTradeStore`.

use crate::domain::market::trade_filter::TradeFilter;
use crate::domain::ports::TradeStore;
use crate::domain::trading::types::Trade;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct TradeLog {
    /// Insertion order
    trades: Vec<Trade>,
    hashes: HashSet<String>,
}

/// In-memory implementation of TradeStore
pub struct InMemoryTradeStore {
    log: Arc<RwLock<TradeLog>>,
}

impl InMemoryTradeStore {
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(TradeLog::default())),
        }
    }

    pub async fn count(&self) -> usize {
        self.log.read().await.trades.len()
    }
}

impl Default for InMemoryTradeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TradeStore for InMemoryTradeStore {
    async fn find_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>> {
        let log = self.log.read().await;
        let mut matched: Vec<Trade> = log
            .trades
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();

        // Stable sort keeps insertion order for equal timestamps
        matched.sort_by_key(|t| t.created_at);
        Ok(matched)
    }

    async fn save(&self, trade: &Trade) -> Result<()> {
        let mut log = self.log.write().await;
        if !log.hashes.insert(trade.hash.clone()) {
            anyhow::bail!("Trade {} already stored", trade.hash);
        }
        log.trades.push(trade.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::trade_filter::TimeRange;
    use crate::domain::trading::types::{Pair, TradeStatus};
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn at(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, min, 0).unwrap()
    }

    fn create_test_trade(hash: &str, status: TradeStatus, ts: DateTime<Utc>) -> Trade {
        Trade {
            hash: hash.to_string(),
            pair: Pair::new("WETH", "DAI"),
            price: dec!(100),
            amount: dec!(1),
            status,
            created_at: ts,
        }
    }

    #[tokio::test]
    async fn test_trade_store_save_and_find() {
        let store = InMemoryTradeStore::new();
        store
            .save(&create_test_trade("b", TradeStatus::Success, at(5)))
            .await
            .unwrap();
        store
            .save(&create_test_trade("a", TradeStatus::Success, at(1)))
            .await
            .unwrap();
        store
            .save(&create_test_trade("c", TradeStatus::Failed, at(2)))
            .await
            .unwrap();

        let range = TimeRange::new(at(0), at(10)).unwrap();
        let found = store
            .find_trades(&TradeFilter::build_predicate(range, &[]))
            .await
            .unwrap();

        let hashes: Vec<&str> = found.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["a", "b"]);
        assert_eq!(store.count().await, 3);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemoryTradeStore::new();
        for hash in ["x", "y", "z"] {
            store
                .save(&create_test_trade(hash, TradeStatus::Success, at(3)))
                .await
                .unwrap();
        }

        let range = TimeRange::new(at(0), at(10)).unwrap();
        let found = store
            .find_trades(&TradeFilter::build_predicate(range, &[]))
            .await
            .unwrap();

        let hashes: Vec<&str> = found.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn test_duplicate_detected_among_many_trades() {
        let store = InMemoryTradeStore::new();
        for i in 0..1_000 {
            store
                .save(&create_test_trade(&format!("0x{:04x}", i), TradeStatus::Success, at(i % 60)))
                .await
                .unwrap();
        }

        let err = store
            .save(&create_test_trade("0x0000", TradeStatus::Success, at(59)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("0x0000"));
        assert_eq!(store.count().await, 1_000);
    }

    #[tokio::test]
    async fn test_duplicate_hash_is_rejected() {
        let store = InMemoryTradeStore::new();
        let trade = create_test_trade("dup", TradeStatus::Success, at(1));
        store.save(&trade).await.unwrap();
        assert!(store.save(&trade).await.is_err());
        assert_eq!(store.count().await, 1);
    }
}
