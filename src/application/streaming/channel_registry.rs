//! Live OHLCV channels.
//!
//! Lock order is always registry map, then channel state. The map lock is
//! never held while a channel is being updated by dispatch, and no lock is
//! held across an `.await`.

use crate::application::market_data::candle_aggregator::CandleBuilder;
use crate::application::market_data::query_engine::HistoricalQueryEngine;
use crate::domain::errors::OhlcvError;
use crate::domain::market::channel_key::ChannelKey;
use crate::domain::market::messages::OhlcvMessage;
use crate::domain::ports::{Subscriber, SubscriberId};
use crate::domain::trading::types::{Candle, Pair, Trade};
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ChannelState {
    subscribers: HashMap<SubscriberId, Arc<dyn Subscriber>>,
    /// Open bucket per pair; a bucket is final once a later one opens
    open_buckets: HashMap<Pair, CandleBuilder>,
    /// Buckets starting before this are final for every pair
    floor: DateTime<Utc>,
    late_trades: u64,
}

/// Outcome of applying one trade to one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelUpdate {
    pub candle: Candle,
    /// A new bucket was opened and the previous one finalized
    pub rolled_over: bool,
    pub delivered: usize,
    pub dropped: usize,
}

/// One live channel: its subscribers and the running candle of its open bucket
pub struct Channel {
    key: ChannelKey,
    name: String,
    state: Mutex<ChannelState>,
}

impl Channel {
    fn new(key: ChannelKey) -> Self {
        Self {
            name: key.to_string(),
            key,
            state: Mutex::new(ChannelState {
                subscribers: HashMap::new(),
                open_buckets: HashMap::new(),
                floor: DateTime::<Utc>::MIN_UTC,
                late_trades: 0,
            }),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn late_trades(&self) -> u64 {
        self.state.lock().late_trades
    }

    /// Oldest bucket start the channel still accepts
    pub fn floor(&self) -> DateTime<Utc> {
        self.state.lock().floor
    }

    /// Running candle of the open bucket for `pair`
    pub fn open_candle(&self, pair: &Pair) -> Option<Candle> {
        self.state.lock().open_buckets.get(pair).map(CandleBuilder::build)
    }

    /// Fold `trade` into the open bucket and broadcast the result.
    ///
    /// Broadcasting happens under the channel lock so that a subscriber
    /// removed by `unsubscribe` never receives a later update. Sends are
    /// non-blocking, so a slow subscriber cannot stall the others.
    pub fn apply(&self, trade: &Trade) -> Result<ChannelUpdate, OhlcvError> {
        let bucket_start = self.key.spec.bucket_start(trade.created_at)?;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if bucket_start < state.floor {
            state.late_trades += 1;
            return Err(OhlcvError::LateTrade {
                hash: trade.hash.clone(),
                channel: self.name.clone(),
                bucket_start,
                open_start: state.floor,
            });
        }

        let rolled_over = match state.open_buckets.get_mut(&trade.pair) {
            Some(open) if open.start_time() == bucket_start => {
                open.update(trade.price, trade.amount);
                false
            }
            Some(open) if open.start_time() > bucket_start => {
                let open_start = open.start_time();
                state.late_trades += 1;
                return Err(OhlcvError::LateTrade {
                    hash: trade.hash.clone(),
                    channel: self.name.clone(),
                    bucket_start,
                    open_start,
                });
            }
            Some(open) => {
                let finalized = open.build();
                debug!(
                    "Channel {}: bucket {} finalized → O:{} H:{} L:{} C:{} V:{} N:{}",
                    self.name,
                    finalized.timestamp,
                    finalized.open,
                    finalized.high,
                    finalized.low,
                    finalized.close,
                    finalized.volume,
                    finalized.count
                );
                *open = CandleBuilder::new(
                    trade.pair.clone(),
                    bucket_start,
                    trade.price,
                    trade.amount,
                );
                true
            }
            None => {
                state.open_buckets.insert(
                    trade.pair.clone(),
                    CandleBuilder::new(trade.pair.clone(), bucket_start, trade.price, trade.amount),
                );
                true
            }
        };
        if rolled_over {
            state.floor = state.floor.max(bucket_start);
        }

        let candle = match state.open_buckets.get(&trade.pair) {
            Some(open) => open.build(),
            None => {
                return Err(OhlcvError::InvalidTimestamp {
                    reason: format!("no open bucket for {} on {}", trade.pair, self.name),
                });
            }
        };

        let mut delivered = 0;
        let mut dropped = 0;
        for (id, subscriber) in state.subscribers.iter() {
            let message = OhlcvMessage::Update {
                channel: self.name.clone(),
                candle: candle.clone(),
            };
            match subscriber.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    dropped += 1;
                    debug!("Channel {}: delivery to {} dropped: {}", self.name, id, e);
                }
            }
        }

        Ok(ChannelUpdate {
            candle,
            rolled_over,
            delivered,
            dropped,
        })
    }
}

/// Maps channel keys to live channels.
///
/// A channel is created by its first subscriber and retired when its last
/// subscriber leaves; retiring drops the open-bucket state, which the next
/// subscriber's snapshot rebuilds.
pub struct ChannelRegistry {
    engine: HistoricalQueryEngine,
    channels: RwLock<HashMap<ChannelKey, Arc<Channel>>>,
    metrics: Option<Metrics>,
}

impl ChannelRegistry {
    pub fn new(engine: HistoricalQueryEngine) -> Self {
        Self {
            engine,
            channels: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add `subscriber` to `key`, creating the channel if needed, and return
    /// the snapshot to deliver before any live update.
    ///
    /// A new channel only accepts trades from the current bucket onwards;
    /// earlier buckets are already final in the snapshot.
    ///
    /// The snapshot is sent as an `Init` message while the channel is locked,
    /// so it always precedes the subscriber's first update. It covers the
    /// latest bucket window; a freshly created channel continues the
    /// snapshot's candles for the current bucket.
    pub async fn subscribe(
        &self,
        key: &ChannelKey,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<Vec<Candle>, OhlcvError> {
        let now = Utc::now();
        let pairs: Vec<Pair> = key.pair.iter().cloned().collect();
        let snapshot = self.engine.query_at(now, &pairs, key.spec, None).await?;
        let current_start = key.spec.bucket_start(now)?;

        let mut channels = self.channels.write();
        let created = !channels.contains_key(key);
        let channel = channels
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Channel::new(key.clone())))
            .clone();

        {
            let mut state = channel.state.lock();
            if created {
                state.floor = current_start;
                let open = snapshot
                    .iter()
                    .filter_map(CandleBuilder::from_candle)
                    .filter(|builder| builder.start_time() == current_start);
                for builder in open {
                    state.open_buckets.insert(builder.pair().clone(), builder);
                }
            }
            let init = OhlcvMessage::Init {
                channel: channel.name().to_string(),
                candles: snapshot.clone(),
            };
            if let Err(e) = subscriber.send(init) {
                warn!(
                    "ChannelRegistry: snapshot for {} not delivered to {}: {}",
                    channel.name(),
                    subscriber.id(),
                    e
                );
            }
            state.subscribers.insert(subscriber.id(), subscriber);
        }

        if created {
            info!("ChannelRegistry: channel {} created", channel.name());
        }
        debug!(
            "ChannelRegistry: {} subscribers on {}",
            channel.subscriber_count(),
            channel.name()
        );
        self.record_gauges(&channels);

        Ok(snapshot)
    }

    /// Remove a subscriber. Returns whether it was subscribed.
    ///
    /// Safe to call concurrently with dispatch and more than once.
    pub fn unsubscribe(&self, key: &ChannelKey, id: SubscriberId) -> bool {
        let mut channels = self.channels.write();
        let Some(channel) = channels.get(key).cloned() else {
            return false;
        };

        let (removed, now_empty) = {
            let mut state = channel.state.lock();
            let removed = state.subscribers.remove(&id).is_some();
            (removed, state.subscribers.is_empty())
        };

        if now_empty {
            channels.remove(key);
            info!("ChannelRegistry: channel {} retired", channel.name());
        }
        self.record_gauges(&channels);

        removed
    }

    /// Channels that follow `pair`, in no particular order
    pub fn channels_for(&self, pair: &Pair) -> Vec<Arc<Channel>> {
        self.channels
            .read()
            .values()
            .filter(|c| c.key().follows(pair))
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &ChannelKey) -> Option<Arc<Channel>> {
        self.channels.read().get(key).cloned()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .read()
            .values()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.channels
            .read()
            .values()
            .map(|c| c.subscriber_count())
            .sum()
    }

    fn record_gauges(&self, channels: &HashMap<ChannelKey, Arc<Channel>>) {
        if let Some(metrics) = &self.metrics {
            metrics.active_channels.set(channels.len() as f64);
            metrics
                .active_subscribers
                .set(channels.values().map(|c| c.subscriber_count()).sum::<usize>() as f64);
        }
    }

    pub(crate) fn record_late_trade(&self, error: &OhlcvError) {
        warn!("ChannelRegistry: {}", error);
        if let Some(metrics) = &self.metrics {
            metrics.late_trades_total.inc();
        }
    }
}
