use crate::domain::errors::OhlcvError;
use crate::domain::market::bucket::BucketSpec;
use crate::domain::trading::types::Pair;
use std::fmt;
use std::str::FromStr;

const ALL_PAIRS: &str = "*";

/// Address of a live OHLCV channel: `(pair, duration, unit)`.
///
/// Renders as `BASE::QUOTE::unit::duration`, or `*::unit::duration` for a
/// channel that follows every pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub pair: Option<Pair>,
    pub spec: BucketSpec,
}

impl ChannelKey {
    /// Validate raw subscription parameters into a channel key
    pub fn new(pair: Option<Pair>, duration: i64, unit: &str) -> Result<Self, OhlcvError> {
        let spec = BucketSpec::parse(duration, unit).map_err(|e| OhlcvError::SubscriptionError {
            reason: e.to_string(),
        })?;
        Ok(Self { pair, spec })
    }

    pub fn from_spec(pair: Option<Pair>, spec: BucketSpec) -> Self {
        Self { pair, spec }
    }

    /// Whether trades of `pair` feed this channel
    pub fn follows(&self, pair: &Pair) -> bool {
        self.pair.as_ref().is_none_or(|p| p == pair)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pair {
            Some(pair) => write!(
                f,
                "{}::{}::{}::{}",
                pair.base_token, pair.quote_token, self.spec.unit, self.spec.duration
            ),
            None => write!(
                f,
                "{}::{}::{}",
                ALL_PAIRS, self.spec.unit, self.spec.duration
            ),
        }
    }
}

impl FromStr for ChannelKey {
    type Err = OhlcvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || OhlcvError::SubscriptionError {
            reason: format!("malformed channel key '{}'", s),
        };

        let parts: Vec<&str> = s.split("::").collect();
        let (pair, unit, duration) = match parts.as_slice() {
            [ALL_PAIRS, unit, duration] => (None, *unit, *duration),
            [base, quote, unit, duration] if !base.is_empty() && !quote.is_empty() => {
                (Some(Pair::new(*base, *quote)), *unit, *duration)
            }
            _ => return Err(malformed()),
        };

        let duration: i64 = duration.parse().map_err(|_| malformed())?;
        ChannelKey::new(pair, duration, unit)
    }
}
