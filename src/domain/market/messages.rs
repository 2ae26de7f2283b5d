use crate::domain::errors::OhlcvError;
use crate::domain::trading::types::Candle;
use serde::{Deserialize, Serialize};

/// Payloads pushed to OHLCV subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OhlcvMessage {
    /// Snapshot delivered once, before any live update
    Init {
        channel: String,
        candles: Vec<Candle>,
    },
    /// Running candle of the channel's open bucket
    Update { channel: String, candle: Candle },
    Error {
        channel: String,
        code: String,
        message: String,
    },
}

impl OhlcvMessage {
    pub fn error(channel: impl Into<String>, error: &OhlcvError) -> Self {
        OhlcvMessage::Error {
            channel: channel.into(),
            code: error.code().to_string(),
            message: format!("{}: {}", error.code(), error),
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            OhlcvMessage::Init { channel, .. }
            | OhlcvMessage::Update { channel, .. }
            | OhlcvMessage::Error { channel, .. } => channel,
        }
    }
}
