//! Transactional batch execution with bounded blast radius.
//!
//! Operations are committed in chunks. A failing chunk is rolled back as a
//! unit and its operations are retried one by one in their own transactions,
//! so a single malformed record can never block the rest of the run. Records
//! that fail even in isolation are Rejected and the run moves on.

use sqlx::{SqliteConnection, SqlitePool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::resolver::LookupResolver;
use crate::application::upserter::{
    self, ResolvedForeignKeys, build_attribute, build_feature_benefit,
};
use crate::application::walker::ImportOp;
use crate::domain::entities::{HierarchyLevel, LookupKind};
use crate::domain::errors::ImportError;
use crate::domain::payload::LookupRecord;
use crate::domain::report::{EntityKind, ImportReport, UpsertOutcome};
use crate::infrastructure::catalog_store;

/// Outcome buffered while a batch transaction is open. Folded into the
/// report only after the batch commits, so a rollback leaves the counts
/// untouched.
#[derive(Debug)]
struct StagedOutcome {
    kind: EntityKind,
    outcome: UpsertOutcome,
    external_id: String,
    reason: Option<String>,
}

impl StagedOutcome {
    fn applied(kind: EntityKind, outcome: UpsertOutcome, external_id: String) -> Self {
        Self {
            kind,
            outcome,
            external_id,
            reason: None,
        }
    }

    fn rejected(kind: EntityKind, external_id: String, reason: String) -> Self {
        Self {
            kind,
            outcome: UpsertOutcome::Rejected,
            external_id,
            reason: Some(reason),
        }
    }
}

pub struct BatchCommitController<'a> {
    pool: &'a SqlitePool,
    batch_size: usize,
    cancel: &'a CancellationToken,
}

impl<'a> BatchCommitController<'a> {
    pub fn new(pool: &'a SqlitePool, batch_size: usize, cancel: &'a CancellationToken) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
            cancel,
        }
    }

    /// Run all operations in committed chunks. Returns normally on
    /// cancellation; the report then reflects the committed prefix.
    pub async fn process(
        &self,
        ops: &[ImportOp],
        resolver: &mut LookupResolver,
        report: &mut ImportReport,
    ) -> Result<(), ImportError> {
        for (batch_no, chunk) in ops.chunks(self.batch_size).enumerate() {
            // A batch once started runs to completion; cancellation is
            // honored only at this boundary.
            if self.cancel.is_cancelled() {
                warn!(batch = batch_no, "import cancelled between batches");
                break;
            }

            match self.try_batch(chunk, resolver).await {
                Ok(staged) => {
                    debug!(batch = batch_no, operations = chunk.len(), "batch committed");
                    fold(report, staged);
                }
                Err(err) => {
                    warn!(
                        batch = batch_no,
                        error = %err,
                        "batch failed, retrying records individually"
                    );
                    resolver.invalidate();
                    self.retry_individually(chunk, resolver, report).await;
                }
            }
        }
        Ok(())
    }

    async fn try_batch(
        &self,
        chunk: &[ImportOp],
        resolver: &mut LookupResolver,
    ) -> Result<Vec<StagedOutcome>, ImportError> {
        let mut tx = self.pool.begin().await?;
        let mut staged = Vec::with_capacity(chunk.len());
        for op in chunk {
            execute_op(&mut tx, op, resolver, &mut staged).await?;
        }
        tx.commit().await?;
        Ok(staged)
    }

    async fn retry_individually(
        &self,
        chunk: &[ImportOp],
        resolver: &mut LookupResolver,
        report: &mut ImportReport,
    ) {
        for op in chunk {
            match self.try_batch(std::slice::from_ref(op), resolver).await {
                Ok(staged) => fold(report, staged),
                Err(err) => {
                    resolver.invalidate();
                    report.record_rejected(op.kind(), op.external_id(), err.to_string());
                }
            }
        }
    }
}

fn fold(report: &mut ImportReport, staged: Vec<StagedOutcome>) {
    for entry in staged {
        match entry.outcome {
            UpsertOutcome::Rejected => report.record_rejected(
                entry.kind,
                entry.external_id,
                entry.reason.unwrap_or_default(),
            ),
            outcome => report.record(entry.kind, outcome),
        }
    }
}

fn lookup_entity_kind(kind: LookupKind) -> EntityKind {
    match kind {
        LookupKind::AttributeGroup => EntityKind::AttributeGroup,
        LookupKind::DataType => EntityKind::DataType,
        LookupKind::UnitOfMeasure => EntityKind::UnitOfMeasure,
    }
}

/// Resolve an optional embedded lookup sub-object. Absent means a null
/// foreign key; present-but-invalid is a record-level error the caller maps
/// to a rejection of the owning record.
async fn resolve_optional(
    conn: &mut SqliteConnection,
    resolver: &mut LookupResolver,
    kind: LookupKind,
    sub: Option<&LookupRecord>,
    fallback_store: &str,
    now: chrono::DateTime<chrono::Utc>,
    staged: &mut Vec<StagedOutcome>,
) -> Result<Option<String>, ImportError> {
    let Some(record) = sub else {
        return Ok(None);
    };
    let (entity, created) = resolver
        .resolve_or_create(conn, kind, record, fallback_store, now)
        .await?;
    if created {
        staged.push(StagedOutcome::applied(
            lookup_entity_kind(kind),
            UpsertOutcome::Created,
            format!("{}@{}", entity.code, entity.store),
        ));
    }
    Ok(Some(entity.id))
}

/// Execute one operation inside the current transaction. Record-level
/// failures become staged rejections; only storage errors propagate and
/// abort the batch.
async fn execute_op(
    conn: &mut SqliteConnection,
    op: &ImportOp,
    resolver: &mut LookupResolver,
    staged: &mut Vec<StagedOutcome>,
) -> Result<(), ImportError> {
    let now = chrono::Utc::now();
    match op {
        ImportOp::Attribute {
            category_id,
            scraped_at,
            record,
        } => {
            // Parent first: a rejected attribute must not mint lookup rows.
            let parent_ok = catalog_store::hierarchy_node_exists(
                conn,
                HierarchyLevel::Category,
                *category_id,
            )
            .await?;
            if !parent_ok {
                staged.push(StagedOutcome::rejected(
                    EntityKind::Attribute,
                    record.id.to_string(),
                    format!("category {category_id} not found"),
                ));
                return Ok(());
            }

            let mut resolved: [Option<String>; 3] = [None, None, None];
            let subs = [
                (LookupKind::AttributeGroup, record.attribute_group.as_ref()),
                (LookupKind::DataType, record.data_type.as_ref()),
                (LookupKind::UnitOfMeasure, record.uom.as_ref()),
            ];
            for (slot, (kind, sub)) in subs.into_iter().enumerate() {
                match resolve_optional(conn, resolver, kind, sub, &record.store, now, staged).await
                {
                    Ok(id) => resolved[slot] = id,
                    Err(err) if err.is_record_level() => {
                        staged.push(StagedOutcome::rejected(
                            EntityKind::Attribute,
                            record.id.to_string(),
                            err.to_string(),
                        ));
                        return Ok(());
                    }
                    Err(err) => return Err(err),
                }
            }
            let [group_id, data_type_id, uom_id] = resolved;
            let fks = ResolvedForeignKeys {
                group_id,
                data_type_id,
                uom_id,
            };

            let candidate = build_attribute(record, *category_id, *scraped_at, fks, now);
            match upserter::upsert_attribute(conn, &candidate).await {
                Ok(outcome) => staged.push(StagedOutcome::applied(
                    EntityKind::Attribute,
                    outcome,
                    record.id.to_string(),
                )),
                Err(err) if err.is_record_level() => staged.push(StagedOutcome::rejected(
                    EntityKind::Attribute,
                    record.id.to_string(),
                    err.to_string(),
                )),
                Err(err) => return Err(err),
            }
        }
        ImportOp::FeatureBenefit { record } => {
            let candidate = build_feature_benefit(record, now);
            match upserter::upsert_feature_benefit(conn, &candidate).await {
                Ok(outcome) => staged.push(StagedOutcome::applied(
                    EntityKind::FeatureBenefit,
                    outcome,
                    record.external_id.to_string(),
                )),
                Err(err) if err.is_record_level() => staged.push(StagedOutcome::rejected(
                    EntityKind::FeatureBenefit,
                    record.external_id.to_string(),
                    err.to_string(),
                )),
                Err(err) => return Err(err),
            }
        }
    }
    Ok(())
}
