//! Collaborator ports.
//!
//! The trade store and the subscriber transport live outside this crate; the
//! core only depends on these traits.

use crate::domain::market::messages::OhlcvMessage;
use crate::domain::market::trade_filter::TradeFilter;
use crate::domain::trading::types::Trade;
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub type SubscriberId = Uuid;

/// Persistent trade storage
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// All trades matching `filter`, sorted by `created_at` ascending.
    /// Trades sharing a timestamp keep their insertion order.
    async fn find_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>>;

    /// Persist a trade handed over by the matching engine
    async fn save(&self, trade: &Trade) -> Result<()>;
}

/// Addressable sink owned by the transport layer.
///
/// `send` must not block: backpressure and drop policy belong to the
/// transport. An `Err` means the message was not delivered.
pub trait Subscriber: Send + Sync {
    fn id(&self) -> SubscriberId;

    fn send(&self, message: OhlcvMessage) -> Result<()>;
}

pub type DisconnectHandler = Box<dyn FnOnce() + Send + 'static>;

/// A subscriber whose lifetime is bound to a transport connection
pub trait Connection: Subscriber {
    /// Run `handler` once when the connection goes away. If it is already
    /// gone, the handler runs immediately.
    fn register_disconnect_handler(&self, handler: DisconnectHandler);
}
