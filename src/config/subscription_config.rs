//! Live subscription configuration parsing from environment variables.

use anyhow::{Context, Result};
use std::env;

/// Subscription environment configuration
#[derive(Debug, Clone)]
pub struct SubscriptionEnvConfig {
    /// Messages buffered per connection before deliveries are dropped
    pub subscriber_buffer: usize,
}

impl Default for SubscriptionEnvConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}

impl SubscriptionEnvConfig {
    pub fn from_env() -> Result<Self> {
        let subscriber_buffer = env::var("SUBSCRIBER_BUFFER")
            .unwrap_or_else(|_| "256".to_string())
            .parse::<usize>()
            .context("Failed to parse SUBSCRIBER_BUFFER")?;

        if subscriber_buffer == 0 {
            anyhow::bail!("SUBSCRIBER_BUFFER must be at least 1");
        }

        Ok(Self { subscriber_buffer })
    }
}
