use crate::application::streaming::channel_registry::ChannelRegistry;
use crate::domain::errors::OhlcvError;
use crate::domain::trading::types::Trade;
use crate::infrastructure::observability::Metrics;
use std::sync::Arc;
use tracing::{debug, error};

/// What happened to one confirmed trade
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub channels: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub late: usize,
}

/// Routes confirmed trades into every live channel that follows their pair
#[derive(Clone)]
pub struct LiveUpdateDispatcher {
    registry: Arc<ChannelRegistry>,
    metrics: Option<Metrics>,
}

impl LiveUpdateDispatcher {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Fold `trade` into the open bucket of each matching channel and push the
    /// updated candle to that channel's subscribers.
    ///
    /// Late trades are logged and counted, never returned as failures, so one
    /// bad trade cannot interrupt dispatch for unrelated channels.
    pub fn on_trade_confirmed(&self, trade: &Trade) -> DispatchReport {
        let mut report = DispatchReport::default();

        if !trade.is_confirmed() {
            debug!(
                "LiveUpdateDispatcher: ignoring {} trade {}",
                trade.status, trade.hash
            );
            self.record("ignored");
            return report;
        }

        for channel in self.registry.channels_for(&trade.pair) {
            report.channels += 1;
            match channel.apply(trade) {
                Ok(update) => {
                    report.delivered += update.delivered;
                    report.dropped += update.dropped;
                    if let Some(metrics) = &self.metrics {
                        metrics.broadcasts_total.inc_by(update.delivered as f64);
                        metrics.dropped_deliveries_total.inc_by(update.dropped as f64);
                    }
                }
                Err(e @ OhlcvError::LateTrade { .. }) => {
                    report.late += 1;
                    self.registry.record_late_trade(&e);
                }
                Err(e) => {
                    error!(
                        "LiveUpdateDispatcher: {} on {} failed: {}",
                        trade.hash,
                        channel.name(),
                        e
                    );
                }
            }
        }

        debug!(
            "LiveUpdateDispatcher: {} @ {} → {} channels, {} delivered",
            trade.pair, trade.price, report.channels, report.delivered
        );
        self.record("dispatched");

        report
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_trades_ingested(outcome);
        }
    }
}
