use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Shared SQLite pool holding the trade table
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str, max_connections: u32) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        let file_path = db_url
            .strip_prefix("sqlite://")
            .filter(|p| !p.starts_with(":memory:"));
        if let Some(path_part) = file_path {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid database url: {}", db_url))?
            .create_if_missing(true);
        if file_path.is_some() {
            options = options.journal_mode(SqliteJournalMode::Wal); // Better for concurrency
        }

        // Every connection to an in-memory url opens its own empty database,
        // so the pool must hold exactly one and never recycle it
        let in_memory = db_url.contains(":memory:") || db_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // Decimals are stored as TEXT to keep every digit; created_at is epoch ms
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                hash TEXT PRIMARY KEY,
                base_token TEXT NOT NULL,
                quote_token TEXT NOT NULL,
                price TEXT NOT NULL,
                amount TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_trades_pair_time
            ON trades (base_token, quote_token, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trade pair index")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_trades_status_time
            ON trades (status, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create trade status index")?;

        info!("Database schema initialized");
        Ok(())
    }
}
