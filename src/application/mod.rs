//! Application layer - the idempotent hierarchical import engine.

pub mod batch;
pub mod import_engine;
pub mod resolver;
pub mod upserter;
pub mod walker;

pub use import_engine::ImportEngine;
pub use resolver::LookupResolver;
pub use walker::ImportOp;
