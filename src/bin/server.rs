//! candlefeed Server - headless OHLCV service
//!
//! Reads newline-delimited JSON from stdin, one request per line:
//! - a confirmed trade (`{"hash": .., "pair": {"baseToken": .., "quoteToken": ..}, "price": .., ...}`)
//!   is saved to the trade store, then pushed to live channels;
//! - `{"subscribe": "WETH::DAI::min::5"}` opens a live channel whose messages
//!   are written to stdout with an `OHLCV:` prefix;
//! - `{"unsubscribe": "WETH::DAI::min::5"}` closes it again.
//!
//! Metrics are pushed via structured JSON logs to stdout.
//!
//! # Usage
//! ```sh
//! DATABASE_URL=memory cargo run --bin server < trades.ndjson
//! ```
//!
//! # Environment Variables
//! - `DATABASE_URL` - `memory` or a sqlite url (default: sqlite://data/candlefeed.db)
//! - `STORE_TIMEOUT_MS` - Upper bound for one trade store query (default: 5000)
//! - `SUBSCRIBER_BUFFER` - Messages buffered per live channel (default: 256)
//! - `OBSERVABILITY_ENABLED` - Enable metrics reporting (default: true)
//! - `OBSERVABILITY_INTERVAL` - Interval in seconds between metric outputs (default: 60)

use anyhow::{Context, Result};
use candlefeed::application::{ChannelHandle, OhlcvService};
use candlefeed::config::{Config, StoreBackend};
use candlefeed::domain::market::channel_key::ChannelKey;
use candlefeed::domain::market::messages::OhlcvMessage;
use candlefeed::domain::ports::TradeStore;
use candlefeed::domain::trading::types::Trade;
use candlefeed::infrastructure::InMemoryTradeStore;
use candlefeed::infrastructure::observability::{Metrics, MetricsReporter};
use candlefeed::infrastructure::persistence::{Database, SqliteTradeStore};
use candlefeed::infrastructure::transport::MpscConnection;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, debug, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Deserialize)]
#[serde(untagged)]
enum Request {
    Subscribe { subscribe: String },
    Unsubscribe { unsubscribe: String },
    Trade(Box<Trade>),
}

struct LiveChannel {
    connection: Arc<MpscConnection>,
    handle: ChannelHandle,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays machine-readable
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stderr_layer)
        .init();

    info!("candlefeed Server {} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: Store={:?}, Timeout={:?}, Buffer={}",
        config.store.backend, config.store.timeout, config.subscription.subscriber_buffer
    );

    let store: Arc<dyn TradeStore> = match &config.store.backend {
        StoreBackend::InMemory => {
            info!("Using in-memory trade store");
            Arc::new(InMemoryTradeStore::new())
        }
        StoreBackend::Sqlite { url } => {
            let db = Database::new(url, config.store.max_connections).await?;
            Arc::new(SqliteTradeStore::new(db.pool))
        }
    };

    let metrics = Metrics::new()?;
    let service = OhlcvService::new(store, config.store.timeout, Some(metrics.clone()));

    if config.observability.enabled {
        let interval = config.observability.interval_seconds;
        let reporter = MetricsReporter::new(service.registry(), metrics, interval);
        tokio::spawn(async move {
            reporter.run().await;
        });
        info!("Metrics reporter started (interval: {}s)", interval);
    } else {
        info!("Metrics reporting disabled.");
    }

    info!("Server running. Reading requests from stdin, Ctrl+C to shutdown.");

    tokio::select! {
        result = serve(&service, config.subscription.subscriber_buffer) => {
            result?;
            info!("stdin closed. Exiting...");
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received. Exiting...");
        }
    }

    Ok(())
}

async fn serve(service: &OhlcvService, buffer: usize) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut live: HashMap<ChannelKey, LiveChannel> = HashMap::new();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Skipping malformed request: {}", e);
                continue;
            }
        };

        match request {
            Request::Trade(trade) => match service.ingest_trade(&trade).await {
                Ok(report) => debug!(
                    "Trade {} dispatched to {} channels",
                    trade.hash, report.channels
                ),
                Err(e) => warn!("Trade {} rejected: {:#}", trade.hash, e),
            },
            Request::Subscribe { subscribe } => {
                subscribe_channel(service, &mut live, &subscribe, buffer).await
            }
            Request::Unsubscribe { unsubscribe } => {
                let removed = unsubscribe
                    .parse::<ChannelKey>()
                    .ok()
                    .and_then(|key| live.remove(&key));
                match removed {
                    Some(channel) => {
                        service.unsubscribe_ohlcv(&channel.handle);
                        channel.connection.disconnect();
                    }
                    None => warn!("Not subscribed to {}", unsubscribe),
                }
            }
        }
    }

    for channel in live.into_values() {
        channel.connection.disconnect();
    }
    Ok(())
}

async fn subscribe_channel(
    service: &OhlcvService,
    live: &mut HashMap<ChannelKey, LiveChannel>,
    raw_key: &str,
    buffer: usize,
) {
    let key = match raw_key.parse::<ChannelKey>() {
        Ok(key) => key,
        Err(e) => {
            warn!("Cannot subscribe to {}: {}", raw_key, e);
            print_message(&OhlcvMessage::error(raw_key, &e));
            return;
        }
    };
    if live.contains_key(&key) {
        warn!("Already subscribed to {}", key);
        return;
    }

    let (connection, mut receiver) = MpscConnection::new(buffer);
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            print_message(&message);
        }
    });

    let subscribed = service
        .subscribe_ohlcv(
            connection.clone(),
            key.pair.clone(),
            i64::from(key.spec.duration),
            key.spec.unit.as_str(),
        )
        .await;

    match subscribed {
        Ok((snapshot, handle)) => {
            info!("Subscribed to {} ({} candles)", handle.key, snapshot.len());
            live.insert(handle.key.clone(), LiveChannel { connection, handle });
        }
        Err(e) => warn!("Cannot subscribe to {}: {}", key, e),
    }
}

fn print_message(message: &OhlcvMessage) {
    match serde_json::to_string(message) {
        Ok(json) => println!("OHLCV:{}", json),
        Err(e) => warn!("Failed to serialize message: {}", e),
    }
}
