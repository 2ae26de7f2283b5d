//! Service boundary for OHLCV: historical queries, live subscriptions and
//! the confirmed-trade ingress from the matching engine.

use crate::application::market_data::query_engine::HistoricalQueryEngine;
use crate::application::streaming::channel_registry::ChannelRegistry;
use crate::application::streaming::dispatcher::{DispatchReport, LiveUpdateDispatcher};
use crate::domain::errors::OhlcvError;
use crate::domain::market::bucket::BucketSpec;
use crate::domain::market::channel_key::ChannelKey;
use crate::domain::market::messages::OhlcvMessage;
use crate::domain::market::trade_filter::TimeRange;
use crate::domain::ports::{Connection, Subscriber, SubscriberId, TradeStore};
use crate::domain::trading::types::{Candle, Pair, Trade};
use crate::infrastructure::observability::Metrics;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Returned by a successful subscription; pass it back to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub key: ChannelKey,
    pub subscriber: SubscriberId,
}

/// Channels each live connection is subscribed to. A connection gets one
/// disconnect handler, registered with its first subscription.
type ConnectionChannels = Arc<Mutex<HashMap<SubscriberId, HashSet<ChannelKey>>>>;

pub struct OhlcvService {
    store: Arc<dyn TradeStore>,
    engine: HistoricalQueryEngine,
    registry: Arc<ChannelRegistry>,
    dispatcher: LiveUpdateDispatcher,
    connections: ConnectionChannels,
    metrics: Option<Metrics>,
}

impl OhlcvService {
    pub fn new(store: Arc<dyn TradeStore>, timeout: Duration, metrics: Option<Metrics>) -> Self {
        let (engine, registry) = match &metrics {
            Some(m) => {
                let engine =
                    HistoricalQueryEngine::new(store.clone(), timeout).with_metrics(m.clone());
                let registry = ChannelRegistry::new(engine.clone()).with_metrics(m.clone());
                (engine, registry)
            }
            None => {
                let engine = HistoricalQueryEngine::new(store.clone(), timeout);
                (engine.clone(), ChannelRegistry::new(engine))
            }
        };
        let registry = Arc::new(registry);

        let dispatcher = match &metrics {
            Some(m) => LiveUpdateDispatcher::new(registry.clone()).with_metrics(m.clone()),
            None => LiveUpdateDispatcher::new(registry.clone()),
        };

        Self {
            store,
            engine,
            registry,
            dispatcher,
            connections: Arc::new(Mutex::new(HashMap::new())),
            metrics,
        }
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    /// Subscribe `connection` to the `(pair, duration, unit)` channel.
    ///
    /// On success the connection has already received the `Init` snapshot,
    /// and disconnecting it unsubscribes. On failure the connection receives
    /// an `Error` message and stays open.
    pub async fn subscribe_ohlcv<C>(
        &self,
        connection: Arc<C>,
        pair: Option<Pair>,
        duration: i64,
        unit: &str,
    ) -> Result<(Vec<Candle>, ChannelHandle), OhlcvError>
    where
        C: Connection + 'static,
    {
        let key = match ChannelKey::new(pair.clone(), duration, unit) {
            Ok(key) => key,
            Err(e) => {
                let channel = match &pair {
                    Some(pair) => format!(
                        "{}::{}::{}::{}",
                        pair.base_token, pair.quote_token, unit, duration
                    ),
                    None => format!("*::{}::{}", unit, duration),
                };
                self.reject(connection.as_ref(), &channel, &e);
                return Err(e);
            }
        };

        let subscriber: Arc<dyn Subscriber> = connection.clone();
        let snapshot = match self.registry.subscribe(&key, subscriber).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.reject(connection.as_ref(), &key.to_string(), &e);
                return Err(e);
            }
        };

        let handle = ChannelHandle {
            key: key.clone(),
            subscriber: connection.id(),
        };

        let first_subscription = {
            let mut connections = self.connections.lock();
            let first = !connections.contains_key(&handle.subscriber);
            connections
                .entry(handle.subscriber)
                .or_default()
                .insert(key);
            first
        };

        if first_subscription {
            let registry = self.registry.clone();
            let connections = self.connections.clone();
            let id = handle.subscriber;
            connection.register_disconnect_handler(Box::new(move || {
                let keys = connections.lock().remove(&id).unwrap_or_default();
                for key in keys {
                    if registry.unsubscribe(&key, id) {
                        info!("OhlcvService: {} left {} on disconnect", id, key);
                    }
                }
            }));
        }

        Ok((snapshot, handle))
    }

    /// Returns whether the handle was still subscribed
    pub fn unsubscribe_ohlcv(&self, handle: &ChannelHandle) -> bool {
        if let Some(keys) = self.connections.lock().get_mut(&handle.subscriber) {
            keys.remove(&handle.key);
        }
        self.registry.unsubscribe(&handle.key, handle.subscriber)
    }

    /// Candles for `pairs` (all pairs when empty). `range` is a pair of epoch
    /// milliseconds `[from, to)`; without it the latest bucket window is used.
    pub async fn query_ohlcv(
        &self,
        pairs: &[Pair],
        duration: i64,
        unit: &str,
        range: Option<(i64, i64)>,
    ) -> Result<Vec<Candle>, OhlcvError> {
        let spec = BucketSpec::parse(duration, unit)?;
        let range = range
            .map(|(from, to)| TimeRange::from_millis(from, to))
            .transpose()?;
        self.engine.query(pairs, spec, range).await
    }

    /// Ingress from the matching engine for a trade that has just settled
    pub fn notify_trade_confirmed(&self, trade: &Trade) -> DispatchReport {
        self.dispatcher.on_trade_confirmed(trade)
    }

    /// Persist a trade and, once stored, push it to live channels
    pub async fn ingest_trade(&self, trade: &Trade) -> anyhow::Result<DispatchReport> {
        if let Err(e) = self.store.save(trade).await {
            if let Some(metrics) = &self.metrics {
                metrics.inc_trades_ingested("rejected");
            }
            return Err(e);
        }
        Ok(self.notify_trade_confirmed(trade))
    }

    fn reject(&self, connection: &dyn Subscriber, channel: &str, error: &OhlcvError) {
        warn!("OhlcvService: subscription to {} rejected: {}", channel, error);
        if let Err(e) = connection.send(OhlcvMessage::error(channel, error)) {
            warn!(
                "OhlcvService: error notification to {} not delivered: {}",
                connection.id(),
                e
            );
        }
    }
}
