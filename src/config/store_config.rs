//! Trade store configuration parsing from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

const MEMORY_STORE: &str = "memory";

/// Which trade store backs the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Sqlite { url: String },
}

/// Trade store environment configuration
#[derive(Debug, Clone)]
pub struct StoreEnvConfig {
    pub backend: StoreBackend,
    pub timeout: Duration,
    pub max_connections: u32,
}

impl Default for StoreEnvConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite {
                url: "sqlite://data/candlefeed.db".to_string(),
            },
            timeout: Duration::from_millis(5000),
            max_connections: 5,
        }
    }
}

impl StoreEnvConfig {
    pub fn from_env() -> Result<Self> {
        let url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/candlefeed.db".to_string());
        let backend = parse_backend(&url)?;

        let timeout_ms = env::var("STORE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .context("Failed to parse STORE_TIMEOUT_MS")?;

        let max_connections = env::var("STORE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse::<u32>()
            .context("Failed to parse STORE_MAX_CONNECTIONS")?;

        Ok(Self {
            backend,
            timeout: Duration::from_millis(timeout_ms),
            max_connections,
        })
    }
}

fn parse_backend(url: &str) -> Result<StoreBackend> {
    if url.eq_ignore_ascii_case(MEMORY_STORE) {
        return Ok(StoreBackend::InMemory);
    }
    if !url.starts_with("sqlite:") {
        anyhow::bail!(
            "Invalid DATABASE_URL: {}. Must be 'memory' or a sqlite: url",
            url
        );
    }
    Ok(StoreBackend::Sqlite {
        url: url.to_string(),
    })
}
