//! CTC Catalog Import - idempotent import engine for scraped catalog metadata
//!
//! Normalizes hierarchical catalog payloads (attribute groups, data types,
//! units of measure, attributes, and per-level feature/benefit records for a
//! Class → Type → Category tree) into a relational store. Imports are
//! idempotent, duplicate-free and relationship-consistent across repeated
//! runs against changing source data.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the public surface
pub use application::ImportEngine;
pub use domain::errors::ImportError;
pub use domain::report::{EntityKind, ImportReport, UpsertOutcome};
pub use infrastructure::config::ImportConfig;
pub use infrastructure::database_connection::DatabaseConnection;
