//! Insert-or-merge for attributes and feature/benefit records.
//!
//! Matching is by external id (attributes) or by the compound
//! (source_level, source_level_id, external_id) key (feature/benefits).
//! A record whose mandatory parent is missing is a `ParentNotFound` error.
//! The batch executor turns it into a Rejected outcome and the run keeps
//! going.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::domain::entities::{Attribute, FeatureBenefit, HierarchyLevel};
use crate::domain::errors::ImportError;
use crate::domain::payload::{AttributeRecord, FeatureBenefitRecord};
use crate::domain::report::UpsertOutcome;
use crate::infrastructure::catalog_store;

/// Foreign keys produced by the lookup resolver for one attribute.
#[derive(Debug, Clone, Default)]
pub struct ResolvedForeignKeys {
    pub group_id: Option<String>,
    pub data_type_id: Option<String>,
    pub uom_id: Option<String>,
}

/// Map a payload attribute record onto the persisted entity shape.
pub fn build_attribute(
    record: &AttributeRecord,
    category_id: i64,
    scraped_at: DateTime<Utc>,
    fks: ResolvedForeignKeys,
    now: DateTime<Utc>,
) -> Attribute {
    Attribute {
        id: record.id,
        name: record.name.clone(),
        store: record.store.clone(),
        rank: record.rank,
        as_filter: record.as_filter,
        active: record.active,
        category_id,
        group_id: fks.group_id,
        data_type_id: fks.data_type_id,
        uom_id: fks.uom_id,
        scraped_at,
        created_by: record
            .created_by
            .clone()
            .or_else(|| Some("system".to_string())),
        created_at: record.created.unwrap_or(now),
        modified_by: record
            .modified_by
            .clone()
            .or_else(|| Some("system".to_string())),
        modified_at: record.modified.unwrap_or(now),
        deleted_by: record.deleted_by.clone(),
        deleted_at: record.deleted,
    }
}

/// Map a payload feature/benefit record onto the persisted entity shape.
/// The storage id is freshly minted; an existing row keeps its own id on
/// merge.
pub fn build_feature_benefit(record: &FeatureBenefitRecord, now: DateTime<Utc>) -> FeatureBenefit {
    FeatureBenefit {
        id: Uuid::new_v4().to_string(),
        feature_name: record.feature_name.clone(),
        feature_description: record.feature_description.clone(),
        benefit_name: record.benefit_name.clone(),
        benefit_description: record.benefit_description.clone(),
        external_id: record.external_id,
        external_code: record.external_code.clone(),
        priority: record.priority,
        category: record.category.clone(),
        tags: record.tags.clone(),
        source_level: record.source_level,
        source_level_id: record.source_level_id,
        is_active: record.is_active,
        scraped_at: record.scraped_at.unwrap_or(now),
        created_by: Some("system".to_string()),
        created_at: now,
        modified_by: Some("system".to_string()),
        modified_at: now,
        deleted_by: None,
        deleted_at: None,
    }
}

/// Upsert one attribute. The candidate carries already-resolved foreign
/// keys; the category parent must pre-exist.
pub async fn upsert_attribute(
    conn: &mut SqliteConnection,
    candidate: &Attribute,
) -> Result<UpsertOutcome, ImportError> {
    let parent_ok =
        catalog_store::hierarchy_node_exists(conn, HierarchyLevel::Category, candidate.category_id)
            .await?;
    if !parent_ok {
        return Err(ImportError::ParentNotFound {
            level: HierarchyLevel::Category,
            parent_id: candidate.category_id,
        });
    }

    match catalog_store::find_attribute(conn, candidate.id).await? {
        Some(existing) => merge_attribute(conn, candidate, &existing).await,
        None => match catalog_store::insert_attribute(conn, candidate).await {
            Ok(()) => Ok(UpsertOutcome::Created),
            Err(err) if catalog_store::is_unique_violation(&err) => {
                // A concurrent writer inserted the row between our check and
                // the insert; fall through to a merge against the winner.
                match catalog_store::find_attribute(conn, candidate.id).await? {
                    Some(existing) => merge_attribute(conn, candidate, &existing).await,
                    None => Err(ImportError::Storage(err)),
                }
            }
            Err(err) => Err(ImportError::Storage(err)),
        },
    }
}

async fn merge_attribute(
    conn: &mut SqliteConnection,
    candidate: &Attribute,
    existing: &Attribute,
) -> Result<UpsertOutcome, ImportError> {
    if existing.differs_from(candidate) {
        catalog_store::update_attribute(conn, candidate, Utc::now()).await?;
        Ok(UpsertOutcome::Updated)
    } else {
        Ok(UpsertOutcome::Skipped)
    }
}

/// Upsert one feature/benefit record against its hierarchy-level parent.
pub async fn upsert_feature_benefit(
    conn: &mut SqliteConnection,
    candidate: &FeatureBenefit,
) -> Result<UpsertOutcome, ImportError> {
    let parent_ok = catalog_store::hierarchy_node_exists(
        conn,
        candidate.source_level,
        candidate.source_level_id,
    )
    .await?;
    if !parent_ok {
        return Err(ImportError::ParentNotFound {
            level: candidate.source_level,
            parent_id: candidate.source_level_id,
        });
    }

    let existing = catalog_store::find_feature_benefit(
        conn,
        candidate.source_level,
        candidate.source_level_id,
        candidate.external_id,
    )
    .await?;

    match existing {
        Some(existing) => merge_feature_benefit(conn, candidate, &existing).await,
        None => match catalog_store::insert_feature_benefit(conn, candidate).await {
            Ok(()) => Ok(UpsertOutcome::Created),
            Err(err) if catalog_store::is_unique_violation(&err) => {
                let winner = catalog_store::find_feature_benefit(
                    conn,
                    candidate.source_level,
                    candidate.source_level_id,
                    candidate.external_id,
                )
                .await?;
                match winner {
                    Some(existing) => merge_feature_benefit(conn, candidate, &existing).await,
                    None => Err(ImportError::Storage(err)),
                }
            }
            Err(err) => Err(ImportError::Storage(err)),
        },
    }
}

async fn merge_feature_benefit(
    conn: &mut SqliteConnection,
    candidate: &FeatureBenefit,
    existing: &FeatureBenefit,
) -> Result<UpsertOutcome, ImportError> {
    if existing.differs_from(candidate) {
        // Keep the existing row's storage id; only mutable fields merge.
        let mut merged = candidate.clone();
        merged.id = existing.id.clone();
        catalog_store::update_feature_benefit(conn, &merged, Utc::now()).await?;
        Ok(UpsertOutcome::Updated)
    } else {
        Ok(UpsertOutcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payload::parse_attributes_payload;

    #[test]
    fn build_attribute_wires_resolved_foreign_keys() {
        let raw = r#"[{"category_id": 165, "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [{"id": 5302, "name": "Finish Colour", "store": "au", "rank": 3}]}]"#;
        let entries = parse_attributes_payload(raw).unwrap();
        let now = Utc::now();
        let fks = ResolvedForeignKeys {
            data_type_id: Some("dt-1".to_string()),
            ..ResolvedForeignKeys::default()
        };

        let attr = build_attribute(
            &entries[0].attributes[0],
            entries[0].category_id,
            entries[0].scraped_at.unwrap(),
            fks,
            now,
        );
        assert_eq!(attr.id, 5302);
        assert_eq!(attr.category_id, 165);
        assert_eq!(attr.data_type_id.as_deref(), Some("dt-1"));
        assert!(attr.group_id.is_none());
        assert!(attr.uom_id.is_none());
        assert_eq!(attr.created_by.as_deref(), Some("system"));
    }
}
