//! Push-based metrics reporter for candlefeed
//!
//! Periodically outputs channel activity as structured JSON to stdout.
//!
//! **Security**: This system only SENDS data, never accepts requests.

use crate::application::streaming::channel_registry::ChannelRegistry;
use crate::infrastructure::observability::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Metrics snapshot for JSON output
#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub streaming: StreamingSnapshot,
}

#[derive(Serialize)]
pub struct StreamingSnapshot {
    pub channels: usize,
    pub subscribers: usize,
    pub channel_names: Vec<String>,
}

/// Push-based metrics reporter
///
/// Outputs metrics as structured JSON logs on a configurable interval.
/// No HTTP server, no incoming connections - only outbound data.
pub struct MetricsReporter {
    registry: Arc<ChannelRegistry>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    /// Create a new metrics reporter
    ///
    /// # Arguments
    /// * `registry` - Live channel registry
    /// * `metrics` - Prometheus metrics (for internal tracking)
    /// * `interval_seconds` - How often to output metrics (default: 60)
    pub fn new(registry: Arc<ChannelRegistry>, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            registry,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    /// Run the reporter in a loop, outputting metrics periodically
    pub async fn run(self) {
        info!(
            "MetricsReporter: Starting push-based metrics (interval: {:?})",
            self.interval
        );

        loop {
            tokio::time::sleep(self.interval).await;

            let snapshot = self.collect_snapshot();
            match serde_json::to_string(&snapshot) {
                Ok(json) => {
                    // Special prefix so logs can be filtered
                    println!("METRICS_JSON:{}", json);
                    info!(
                        "Channels: {} | Subscribers: {} | Uptime: {}s",
                        snapshot.streaming.channels,
                        snapshot.streaming.subscribers,
                        snapshot.uptime_seconds
                    );
                }
                Err(e) => warn!("Failed to serialize metrics: {}", e),
            }
        }
    }

    fn collect_snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let mut channel_names = self.registry.channel_names();
        channel_names.sort();
        let channels = channel_names.len();
        let subscribers = self.registry.subscriber_count();

        self.metrics.active_channels.set(channels as f64);
        self.metrics.active_subscribers.set(subscribers as f64);
        self.metrics.uptime_seconds.set(uptime as f64);

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            streaming: StreamingSnapshot {
                channels,
                subscribers,
                channel_names,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::market_data::query_engine::HistoricalQueryEngine;
    use crate::domain::market::channel_key::ChannelKey;
    use crate::domain::market::messages::OhlcvMessage;
    use crate::domain::ports::{Subscriber, SubscriberId};
    use crate::infrastructure::repositories::InMemoryTradeStore;
    use uuid::Uuid;

    struct NullSubscriber(SubscriberId);

    impl Subscriber for NullSubscriber {
        fn id(&self) -> SubscriberId {
            self.0
        }

        fn send(&self, _message: OhlcvMessage) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_metrics_snapshot_collection() {
        let engine = HistoricalQueryEngine::new(
            Arc::new(InMemoryTradeStore::new()),
            Duration::from_secs(1),
        );
        let registry = Arc::new(ChannelRegistry::new(engine));
        let key: ChannelKey = "WETH::DAI::min::5".parse().unwrap();
        registry
            .subscribe(&key, Arc::new(NullSubscriber(Uuid::new_v4())))
            .await
            .unwrap();

        let metrics = Metrics::new().expect("Failed to create metrics");
        let reporter = MetricsReporter::new(registry, metrics.clone(), 60);
        let snapshot = reporter.collect_snapshot();

        assert_eq!(snapshot.streaming.channels, 1);
        assert_eq!(snapshot.streaming.subscribers, 1);
        assert_eq!(snapshot.streaming.channel_names, vec!["WETH::DAI::min::5"]);
        assert!(!snapshot.timestamp.is_empty());
        assert!(metrics.render().contains("candlefeed_active_subscribers 1"));
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = MetricsSnapshot {
            timestamp: "2026-01-10T10:00:00Z".to_string(),
            uptime_seconds: 3600,
            version: "0.4.2".to_string(),
            streaming: StreamingSnapshot {
                channels: 2,
                subscribers: 7,
                channel_names: vec!["*::day::1".to_string(), "WETH::DAI::min::5".to_string()],
            },
        };

        let json = serde_json::to_string(&snapshot).expect("Failed to serialize");
        assert!(json.contains("\"subscribers\":7"));
        assert!(json.contains("WETH::DAI::min::5"));
    }
}
