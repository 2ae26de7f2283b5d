// Market data processing: aggregation and historical queries
pub mod market_data;

// Live channels and trade dispatch
pub mod streaming;

// Service boundary
pub mod ohlcv_service;

pub use ohlcv_service::{ChannelHandle, OhlcvService};
