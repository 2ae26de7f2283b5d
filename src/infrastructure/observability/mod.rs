//! Push-based observability for candlefeed
//!
//! This module provides observability through **outbound data only** - no HTTP server,
//! no incoming requests. Prometheus counters are kept in-process and a periodic
//! JSON snapshot is written to stdout (for Loki, Fluentd, CloudWatch).

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
