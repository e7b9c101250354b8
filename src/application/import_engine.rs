//! Top-level import engine facade.
//!
//! One engine instance drives one database; each call plans the payload into
//! dependency-ordered operations and hands them to the batch commit
//! controller. Runs are idempotent: re-importing an identical payload yields
//! no additional Created outcomes.

use chrono::Utc;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::batch::BatchCommitController;
use crate::application::resolver::LookupResolver;
use crate::application::walker::{self, ImportOp};
use crate::domain::errors::ImportError;
use crate::domain::payload::{CategoryAttributesEntry, FeatureBenefitRecord};
use crate::domain::report::ImportReport;
use crate::infrastructure::catalog_store::{self, IntegritySummary};
use crate::infrastructure::config::ImportConfig;

pub struct ImportEngine {
    pool: SqlitePool,
    config: ImportConfig,
    cancel: CancellationToken,
}

impl ImportEngine {
    pub fn new(pool: SqlitePool, config: ImportConfig) -> Self {
        Self {
            pool,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token for cancelling the run from outside (checked between batches).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Import the category → attributes payload.
    pub async fn import_attributes(
        &self,
        entries: Vec<CategoryAttributesEntry>,
    ) -> Result<ImportReport, ImportError> {
        let categories = entries.len();
        let ops = walker::plan_attribute_ops(entries, Utc::now());
        info!(
            categories,
            attributes = ops.len(),
            "starting attributes import"
        );
        self.run(ops).await
    }

    /// Import the per-level feature/benefit payload.
    pub async fn import_feature_benefits(
        &self,
        records: Vec<FeatureBenefitRecord>,
    ) -> Result<ImportReport, ImportError> {
        let ops = walker::plan_feature_benefit_ops(records);
        info!(records = ops.len(), "starting feature/benefit import");
        self.run(ops).await
    }

    async fn run(&self, ops: Vec<ImportOp>) -> Result<ImportReport, ImportError> {
        let mut report = ImportReport::new(self.config.batch.rejected_sample_limit);
        let mut resolver = LookupResolver::new();
        let controller =
            BatchCommitController::new(&self.pool, self.config.batch.batch_size, &self.cancel);
        controller
            .process(&ops, &mut resolver, &mut report)
            .await?;
        report.log_summary();
        Ok(report)
    }

    /// Post-import integrity check: row counts and orphaned foreign keys.
    pub async fn validate_integrity(&self) -> Result<IntegritySummary, ImportError> {
        let summary = catalog_store::integrity_summary(&self.pool).await?;
        info!(
            attribute_groups = summary.attribute_groups,
            data_types = summary.data_types,
            units_of_measure = summary.units_of_measure,
            attributes = summary.attributes,
            feature_benefits = summary.feature_benefits,
            orphaned_attributes = summary.orphaned_attributes,
            orphaned_feature_benefits = summary.orphaned_feature_benefits,
            "integrity summary"
        );
        Ok(summary)
    }
}
