use anyhow::Result;
use async_trait::async_trait;
use candlefeed::application::OhlcvService;
use candlefeed::domain::market::trade_filter::TradeFilter;
use candlefeed::domain::ports::TradeStore;
use candlefeed::domain::trading::types::{Pair, Trade, TradeStatus};
use candlefeed::infrastructure::persistence::{Database, SqliteTradeStore};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

async fn sqlite_service() -> (OhlcvService, Arc<SqliteTradeStore>) {
    let db = Database::new("sqlite::memory:", 1).await.unwrap();
    let store = Arc::new(SqliteTradeStore::new(db.pool));
    let service = OhlcvService::new(store.clone(), Duration::from_secs(2), None);
    (service, store)
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn trade(hash: &str, pair: &Pair, price: Decimal, amount: Decimal, ts: DateTime<Utc>) -> Trade {
    Trade {
        hash: hash.to_string(),
        pair: pair.clone(),
        price,
        amount,
        status: TradeStatus::Success,
        created_at: ts,
    }
}

#[tokio::test]
async fn test_open_high_low_close_follow_time_order() {
    let (service, store) = sqlite_service().await;
    let weth = Pair::new("WETH", "DAI");

    // Saved out of order; the store returns them by creation time
    for (hash, price, min) in [("c", dec!(12), 3), ("a", dec!(10), 1), ("d", dec!(9), 4), ("b", dec!(7), 2)] {
        store
            .save(&trade(hash, &weth, price, dec!(1), at(2024, 3, 1, 10, min)))
            .await
            .unwrap();
    }

    let candles = assert_ok!(
        service
            .query_ohlcv(
                &[weth.clone()],
                1,
                "hour",
                Some((ms(at(2024, 3, 1, 0, 0)), ms(at(2024, 3, 2, 0, 0)))),
            )
            .await
    );

    assert_eq!(candles.len(), 1);
    let candle = &candles[0];
    assert_eq!(candle.open, dec!(10));
    assert_eq!(candle.high, dec!(12));
    assert_eq!(candle.low, dec!(7));
    assert_eq!(candle.close, dec!(9));
    assert_eq!(candle.count, 4);
    assert_eq!(candle.timestamp, ms(at(2024, 3, 1, 10, 0)));
}

#[tokio::test]
async fn test_volume_is_exact() {
    let (service, store) = sqlite_service().await;
    let weth = Pair::new("WETH", "DAI");
    for (i, hash) in ["x", "y", "z"].iter().enumerate() {
        store
            .save(&trade(hash, &weth, dec!(1), dec!(0.1), at(2024, 5, 5, 5, i as u32)))
            .await
            .unwrap();
    }

    let candles = service
        .query_ohlcv(&[], 1, "day", Some((ms(at(2024, 5, 1, 0, 0)), ms(at(2024, 6, 1, 0, 0)))))
        .await
        .unwrap();

    assert_eq!(candles.len(), 1);
    assert_eq!(candles[0].volume, dec!(0.3));
    let json = serde_json::to_value(&candles[0]).unwrap();
    assert_eq!(json["v"], "0.3");
}

#[tokio::test]
async fn test_two_month_buckets_group_november_with_december() {
    let (service, store) = sqlite_service().await;
    let weth = Pair::new("WETH", "DAI");
    for (hash, month) in [("jan", 1), ("feb", 2), ("mar", 3), ("nov", 11), ("dec", 12)] {
        store
            .save(&trade(hash, &weth, dec!(1), dec!(1), at(2023, month, 15, 12, 0)))
            .await
            .unwrap();
    }

    let candles = service
        .query_ohlcv(
            &[weth],
            2,
            "month",
            Some((ms(at(2023, 1, 1, 0, 0)), ms(at(2024, 1, 1, 0, 0)))),
        )
        .await
        .unwrap();

    let starts: Vec<(i64, u64)> = candles.iter().map(|c| (c.timestamp, c.count)).collect();
    assert_eq!(
        starts,
        vec![
            (ms(at(2023, 1, 1, 0, 0)), 2),
            (ms(at(2023, 3, 1, 0, 0)), 1),
            (ms(at(2023, 11, 1, 0, 0)), 2),
        ]
    );
}

#[tokio::test]
async fn test_week_buckets_use_iso_week_year() {
    let (service, store) = sqlite_service().await;
    let weth = Pair::new("WETH", "DAI");
    store
        .save(&trade("new-year", &weth, dec!(1), dec!(1), at(2021, 1, 1, 12, 0)))
        .await
        .unwrap();

    let candles = service
        .query_ohlcv(
            &[weth],
            1,
            "week",
            Some((ms(at(2020, 12, 1, 0, 0)), ms(at(2021, 2, 1, 0, 0)))),
        )
        .await
        .unwrap();

    assert_eq!(candles.len(), 1);
    // 2021-01-01 is in ISO week 53 of 2020, which starts on Monday 2020-12-28
    assert_eq!(candles[0].timestamp, ms(at(2020, 12, 28, 0, 0)));
}

#[tokio::test]
async fn test_pair_filter_and_sparse_output() {
    let (service, store) = sqlite_service().await;
    let weth = Pair::new("WETH", "DAI");
    let zrx = Pair::new("ZRX", "WETH");
    let mkr = Pair::new("MKR", "DAI");

    store.save(&trade("1", &weth, dec!(1), dec!(1), at(2024, 1, 1, 0, 0))).await.unwrap();
    store.save(&trade("2", &zrx, dec!(2), dec!(1), at(2024, 1, 1, 0, 30))).await.unwrap();
    store.save(&trade("3", &mkr, dec!(3), dec!(1), at(2024, 1, 1, 1, 0))).await.unwrap();
    store.save(&trade("4", &weth, dec!(4), dec!(1), at(2024, 1, 1, 5, 0))).await.unwrap();

    let candles = service
        .query_ohlcv(
            &[weth.clone(), zrx.clone()],
            1,
            "hour",
            Some((ms(at(2024, 1, 1, 0, 0)), ms(at(2024, 1, 2, 0, 0)))),
        )
        .await
        .unwrap();

    let got: Vec<(Pair, i64)> = candles.iter().map(|c| (c.pair.clone(), c.timestamp)).collect();
    assert_eq!(got.len(), 3, "no empty buckets between 01:00 and 05:00");
    assert!(got.contains(&(weth.clone(), ms(at(2024, 1, 1, 0, 0)))));
    assert!(got.contains(&(zrx, ms(at(2024, 1, 1, 0, 0)))));
    assert_eq!(got[2], (weth, ms(at(2024, 1, 1, 5, 0))));
}

#[tokio::test]
async fn test_empty_and_invalid_queries() {
    let (service, _) = sqlite_service().await;
    let weth = Pair::new("WETH", "DAI");

    let empty = service.query_ohlcv(&[weth.clone()], 1, "min", None).await.unwrap();
    assert!(empty.is_empty());

    let err = service.query_ohlcv(&[weth.clone()], 1, "", None).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_UNIT");

    let err = service
        .query_ohlcv(&[weth], 1, "min", Some((1_000, 1_000)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_TIME_RANGE");
}

struct StalledStore;

#[async_trait]
impl TradeStore for StalledStore {
    async fn find_trades(&self, _filter: &TradeFilter) -> Result<Vec<Trade>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }

    async fn save(&self, _trade: &Trade) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_stalled_store_surfaces_as_unavailable() {
    let service = OhlcvService::new(Arc::new(StalledStore), Duration::from_millis(20), None);

    let err = service
        .query_ohlcv(&[], 1, "min", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "STORE_UNAVAILABLE");
    assert!(err.is_retryable());
}
