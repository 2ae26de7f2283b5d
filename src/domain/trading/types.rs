use anyhow::{Result, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A trading pair, identified by its base and quote token identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub base_token: String,
    pub quote_token: String,
}

impl Pair {
    pub fn new(base_token: impl Into<String>, quote_token: impl Into<String>) -> Self {
        Self {
            base_token: base_token.into(),
            quote_token: quote_token.into(),
        }
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base_token, self.quote_token)
    }
}

impl FromStr for Pair {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s.split_once('/').map(|(base, quote)| (base.trim(), quote.trim()));
        match parts {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('/') => {
                Ok(Pair::new(base, quote))
            }
            _ => Err(anyhow!(
                "Invalid pair: '{}'. Expected BASE/QUOTE, e.g. WETH/DAI",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Pending,
    Success,
    Failed,
    Invalid,
    Error,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "PENDING"),
            TradeStatus::Success => write!(f, "SUCCESS"),
            TradeStatus::Failed => write!(f, "FAILED"),
            TradeStatus::Invalid => write!(f, "INVALID"),
            TradeStatus::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for TradeStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(TradeStatus::Pending),
            "SUCCESS" => Ok(TradeStatus::Success),
            "FAILED" => Ok(TradeStatus::Failed),
            "INVALID" => Ok(TradeStatus::Invalid),
            "ERROR" => Ok(TradeStatus::Error),
            _ => Err(anyhow!("Invalid trade status: '{}'", s)),
        }
    }
}

/// An executed trade as produced by the matching engine.
///
/// Prices and amounts are exact decimals; only `TradeStatus::Success` trades
/// take part in candle aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub hash: String,
    pub pair: Pair,
    pub price: Decimal,
    pub amount: Decimal,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    pub fn is_confirmed(&self) -> bool {
        self.status == TradeStatus::Success
    }
}

/// One OHLCV candle. `timestamp` is the bucket start in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub pair: Pair,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    #[serde(rename = "o")]
    pub open: Decimal,
    #[serde(rename = "h")]
    pub high: Decimal,
    #[serde(rename = "l")]
    pub low: Decimal,
    #[serde(rename = "c")]
    pub close: Decimal,
    #[serde(rename = "v")]
    pub volume: Decimal,
    pub count: u64,
}

impl Candle {
    pub fn bucket_start(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}
