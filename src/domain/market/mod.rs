// Bucketing, filtering and channel addressing
pub mod bucket;
pub mod bucket_unit;
pub mod channel_key;
pub mod messages;
pub mod trade_filter;
