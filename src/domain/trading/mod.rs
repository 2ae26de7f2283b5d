// Trade and candle value objects
pub mod types;
