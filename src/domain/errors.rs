//! Error taxonomy for the import pipeline.
//!
//! Record-level failures (validation, missing parent) become `Rejected`
//! outcomes in the report and never abort a run. Storage failures abort the
//! current batch, which is then retried record by record. Only structural
//! problems such as an unparsable payload or broken configuration are fatal.

use thiserror::Error;

use crate::domain::entities::HierarchyLevel;

#[derive(Debug, Error)]
pub enum ImportError {
    /// A descriptor is missing a required field; the dependent record is
    /// rejected rather than persisted with a hole in it.
    #[error("validation failed for {entity}: {message}")]
    Validation { entity: String, message: String },

    /// The mandatory parent reference does not resolve to an existing row.
    #[error("{level} {parent_id} not found")]
    ParentNotFound {
        level: HierarchyLevel,
        parent_id: i64,
    },

    /// Database-level failure; transient per-batch, handled by rollback and
    /// individual-record retry.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The payload cannot be parsed at all. Aborts the run.
    #[error("payload is not parsable: {0}")]
    Payload(#[from] serde_json::Error),

    /// A CSV payload cannot be read. Aborts the run.
    #[error("csv payload is not readable: {0}")]
    Csv(#[from] csv::Error),

    /// Broken run configuration (unreadable input file, bad database URL).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ImportError {
    /// Expected per-record failure mode: reject the record, keep going.
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::ParentNotFound { .. })
    }

    /// Structural failure: abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Payload(_) | Self::Csv(_) | Self::Configuration(_))
    }
}
