//! Prometheus metrics definitions for candlefeed
//!
//! All metrics use the `candlefeed_` prefix and are read-only.

use prometheus::{
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Prometheus metrics for the candle service
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Confirmed-trade notifications by outcome
    pub trades_ingested_total: CounterVec,
    /// Trades that fell before a channel's open bucket
    pub late_trades_total: Counter,
    /// Candle updates handed to subscribers
    pub broadcasts_total: Counter,
    /// Candle updates a subscriber could not accept
    pub dropped_deliveries_total: Counter,
    /// Historical queries by outcome
    pub queries_total: CounterVec,
    /// Live channels
    pub active_channels: GenericGauge<AtomicF64>,
    /// Subscribers across all channels
    pub active_subscribers: GenericGauge<AtomicF64>,
    /// Uptime in seconds
    pub uptime_seconds: GenericGauge<AtomicF64>,
    /// Historical query latency in seconds
    pub query_latency_seconds: HistogramVec,
}

impl Metrics {
    /// Create a new Metrics instance with all gauges and counters registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let trades_ingested_total = CounterVec::new(
            Opts::new(
                "candlefeed_trades_ingested_total",
                "Confirmed trade notifications by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(trades_ingested_total.clone()))?;

        let late_trades_total = Counter::with_opts(Opts::new(
            "candlefeed_late_trades_total",
            "Trades older than the open bucket of a channel",
        ))?;
        registry.register(Box::new(late_trades_total.clone()))?;

        let broadcasts_total = Counter::with_opts(Opts::new(
            "candlefeed_broadcasts_total",
            "Candle updates delivered to subscribers",
        ))?;
        registry.register(Box::new(broadcasts_total.clone()))?;

        let dropped_deliveries_total = Counter::with_opts(Opts::new(
            "candlefeed_dropped_deliveries_total",
            "Candle updates rejected by a subscriber",
        ))?;
        registry.register(Box::new(dropped_deliveries_total.clone()))?;

        let queries_total = CounterVec::new(
            Opts::new(
                "candlefeed_queries_total",
                "Historical OHLCV queries by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(queries_total.clone()))?;

        let active_channels = Gauge::with_opts(Opts::new(
            "candlefeed_active_channels",
            "Number of live subscription channels",
        ))?;
        registry.register(Box::new(active_channels.clone()))?;

        let active_subscribers = Gauge::with_opts(Opts::new(
            "candlefeed_active_subscribers",
            "Number of subscribers across all channels",
        ))?;
        registry.register(Box::new(active_subscribers.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "candlefeed_uptime_seconds",
            "Server uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let query_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "candlefeed_query_latency_seconds",
                "Historical query latency in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
            &["unit"],
        )?;
        registry.register(Box::new(query_latency_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            trades_ingested_total,
            late_trades_total,
            broadcasts_total,
            dropped_deliveries_total,
            queries_total,
            active_channels,
            active_subscribers,
            uptime_seconds,
            query_latency_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn inc_trades_ingested(&self, outcome: &str) {
        self.trades_ingested_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_queries(&self, outcome: &str) {
        self.queries_total.with_label_values(&[outcome]).inc();
    }

    /// Observe historical query latency for a bucket unit
    pub fn observe_query_latency(&self, unit: &str, latency: f64) {
        self.query_latency_seconds
            .with_label_values(&[unit])
            .observe(latency);
    }
}
