pub mod channel_registry;
pub mod dispatcher;
