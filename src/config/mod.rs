//! Configuration module for candlefeed.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: Store, Subscription, and Observability.

mod observability_config;
mod store_config;
mod subscription_config;

pub use observability_config::ObservabilityEnvConfig;
pub use store_config::{StoreBackend, StoreEnvConfig};
pub use subscription_config::SubscriptionEnvConfig;

use anyhow::{Context, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub store: StoreEnvConfig,
    pub subscription: SubscriptionEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let store = StoreEnvConfig::from_env().context("Failed to load store config")?;
        let subscription =
            SubscriptionEnvConfig::from_env().context("Failed to load subscription config")?;
        let observability = ObservabilityEnvConfig::from_env();

        Ok(Self {
            store,
            subscription,
            observability,
        })
    }
}
