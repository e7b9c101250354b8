//! Domain module - catalog entities, payload shapes and run accounting.

pub mod entities;
pub mod errors;
pub mod payload;
pub mod report;

pub use entities::{Attribute, FeatureBenefit, HierarchyLevel, HierarchyNode, LookupEntity, LookupKind};
pub use errors::ImportError;
pub use report::{EntityKind, ImportReport, UpsertOutcome};
