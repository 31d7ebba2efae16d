pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_config, connect_with_settings, DbPool, DEFAULT_BUSY_TIMEOUT_MS};
pub use repositories::{HistoryStore, InMemoryHistoryStore, RepositoryError, SqlHistoryStore};
