pub mod observability;
pub mod persistence;
pub mod repositories;
pub mod transport;

pub use repositories::InMemoryTradeStore;
