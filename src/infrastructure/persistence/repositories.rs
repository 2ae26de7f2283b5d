use crate::domain::market::trade_filter::TradeFilter;
use crate::domain::ports::TradeStore;
use crate::domain::trading::types::{Pair, Trade, TradeStatus};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::debug;

/// Trade store backed by the `trades` table
pub struct SqliteTradeStore {
    pool: SqlitePool,
}

impl SqliteTradeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM trades")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }
}

#[async_trait]
impl TradeStore for SqliteTradeStore {
    async fn find_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT hash, base_token, quote_token, price, amount, status, created_at \
             FROM trades WHERE status = ",
        );
        query.push_bind(filter.status.to_string());
        query
            .push(" AND created_at >= ")
            .push_bind(filter.range.start.timestamp_millis());
        query
            .push(" AND created_at < ")
            .push_bind(filter.range.end.timestamp_millis());

        if !filter.pairs.is_empty() {
            query.push(" AND (");
            let mut pairs = query.separated(" OR ");
            for pair in &filter.pairs {
                pairs
                    .push("(base_token = ")
                    .push_bind_unseparated(pair.base_token.clone())
                    .push_unseparated(" AND quote_token = ")
                    .push_bind_unseparated(pair.quote_token.clone())
                    .push_unseparated(")");
            }
            query.push(")");
        }

        // rowid keeps insertion order among equal timestamps
        query.push(" ORDER BY created_at ASC, rowid ASC");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to query trades")?;

        debug!("SqliteTradeStore: {} trades matched", rows.len());
        map_rows_to_trades(rows)
    }

    async fn save(&self, trade: &Trade) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO trades (hash, base_token, quote_token, price, amount, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.hash)
        .bind(&trade.pair.base_token)
        .bind(&trade.pair.quote_token)
        .bind(trade.price.to_string())
        .bind(trade.amount.to_string())
        .bind(trade.status.to_string())
        .bind(trade.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save trade")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Trade {} already stored", trade.hash);
        }
        Ok(())
    }
}

fn map_rows_to_trades(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Trade>> {
    let mut trades = Vec::with_capacity(rows.len());
    for row in rows {
        let hash: String = row.try_get("hash")?;
        let price: String = row.try_get("price")?;
        let amount: String = row.try_get("amount")?;
        let status: String = row.try_get("status")?;
        let created_at: i64 = row.try_get("created_at")?;

        trades.push(Trade {
            pair: Pair::new(
                row.try_get::<String, _>("base_token")?,
                row.try_get::<String, _>("quote_token")?,
            ),
            price: Decimal::from_str(&price)
                .with_context(|| format!("Trade {} has invalid price '{}'", hash, price))?,
            amount: Decimal::from_str(&amount)
                .with_context(|| format!("Trade {} has invalid amount '{}'", hash, amount))?,
            status: TradeStatus::from_str(&status)?,
            created_at: Utc
                .timestamp_millis_opt(created_at)
                .single()
                .ok_or_else(|| anyhow!("Trade {} has invalid timestamp {}", hash, created_at))?,
            hash,
        });
    }
    Ok(trades)
}
