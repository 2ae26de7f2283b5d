//! Operator CLI for the candlefeed trade store
//!
//! `import` loads trades from a CSV file, `query` prints historical candles as JSON.

use anyhow::{Context, Result, anyhow};
use candlefeed::application::OhlcvService;
use candlefeed::config::{Config, StoreBackend};
use candlefeed::domain::ports::TradeStore;
use candlefeed::domain::trading::types::{Pair, Trade, TradeStatus};
use candlefeed::infrastructure::persistence::{Database, SqliteTradeStore};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "candlefeed trade store tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import trades from a CSV file
    ///
    /// Columns: hash,base_token,quote_token,price,amount,status,created_at (epoch ms)
    Import {
        /// CSV file to read
        input: PathBuf,
    },
    /// Print OHLCV candles as JSON
    Query {
        /// Pair as BASE/QUOTE; repeat for several pairs, omit for all pairs
        #[arg(short, long)]
        pair: Vec<String>,

        /// Number of units per bucket
        #[arg(short, long, default_value = "1")]
        duration: i64,

        /// Bucket unit (sec, min, hour, day, week, month, year)
        #[arg(short, long, default_value = "hour")]
        unit: String,

        /// Range start in epoch milliseconds (inclusive)
        #[arg(long, requires = "to")]
        from: Option<i64>,

        /// Range end in epoch milliseconds (exclusive)
        #[arg(long, requires = "from")]
        to: Option<i64>,
    },
}

#[derive(Debug, Deserialize)]
struct TradeRecord {
    hash: String,
    base_token: String,
    quote_token: String,
    // Kept as text so no digit goes through a float
    price: String,
    amount: String,
    status: String,
    created_at: i64,
}

impl TryFrom<TradeRecord> for Trade {
    type Error = anyhow::Error;

    fn try_from(record: TradeRecord) -> Result<Self> {
        Ok(Trade {
            pair: Pair::new(record.base_token, record.quote_token),
            price: Decimal::from_str(&record.price)
                .with_context(|| format!("invalid price '{}'", record.price))?,
            amount: Decimal::from_str(&record.amount)
                .with_context(|| format!("invalid amount '{}'", record.amount))?,
            status: TradeStatus::from_str(&record.status)?,
            created_at: Utc
                .timestamp_millis_opt(record.created_at)
                .single()
                .ok_or_else(|| anyhow!("invalid created_at {}", record.created_at))?,
            hash: record.hash,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Setup logging
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = open_store(&config).await?;

    match cli.command {
        Commands::Import { input } => {
            let (imported, skipped) = import_csv(store.as_ref(), &input).await?;
            info!(
                "Imported {} trades from {:?} ({} skipped)",
                imported, input, skipped
            );
        }
        Commands::Query {
            pair,
            duration,
            unit,
            from,
            to,
        } => {
            let pairs = pair
                .iter()
                .map(|p| Pair::from_str(p))
                .collect::<Result<Vec<_>>>()?;
            let range = from.zip(to);

            let service = OhlcvService::new(store, config.store.timeout, None);
            let candles = service.query_ohlcv(&pairs, duration, &unit, range).await?;
            println!("{}", serde_json::to_string_pretty(&candles)?);
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn TradeStore>> {
    match &config.store.backend {
        StoreBackend::Sqlite { url } => {
            let db = Database::new(url, config.store.max_connections).await?;
            Ok(Arc::new(SqliteTradeStore::new(db.pool)))
        }
        StoreBackend::InMemory => {
            anyhow::bail!("ohlcvctl needs a persistent store; set DATABASE_URL to a sqlite url")
        }
    }
}

async fn import_csv(store: &dyn TradeStore, path: &Path) -> Result<(usize, usize)> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut rdr = csv::Reader::from_reader(BufReader::new(file));

    let mut imported = 0;
    let mut skipped = 0;
    for (line, result) in rdr.deserialize::<TradeRecord>().enumerate() {
        let trade = match result.map_err(anyhow::Error::from).and_then(Trade::try_from) {
            Ok(trade) => trade,
            Err(e) => {
                warn!("Row {}: {:#}", line + 1, e);
                skipped += 1;
                continue;
            }
        };

        match store.save(&trade).await {
            Ok(()) => imported += 1,
            Err(e) => {
                warn!("Row {}: {:#}", line + 1, e);
                skipped += 1;
            }
        }
    }

    Ok((imported, skipped))
}
