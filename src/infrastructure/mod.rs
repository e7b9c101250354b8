//! Infrastructure layer for database access, configuration and logging.

pub mod catalog_store;
pub mod config;
pub mod database_connection;
pub mod logging;

// Re-export commonly used items
pub use config::ImportConfig;
pub use database_connection::DatabaseConnection;
