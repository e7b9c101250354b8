//! SQLite data access for the catalog tables.
//!
//! Every function takes an explicit `&mut SqliteConnection` so the batch
//! controller decides transaction scope: the same code path runs inside a
//! batched transaction or on a plain pooled connection during the
//! individual-record retry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};

use crate::domain::entities::{
    Attribute, FeatureBenefit, HierarchyLevel, HierarchyNode, LookupEntity, LookupKind,
};

/// True when the error is a unique-constraint violation, i.e. a lost
/// creation race against a concurrent writer.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

// ===============================
// LOOKUP TABLES
// ===============================

fn lookup_from_row(kind: LookupKind, row: &SqliteRow) -> LookupEntity {
    LookupEntity {
        id: row.get("id"),
        kind,
        code: row.get("code"),
        store: row.get("store"),
        name: row.get("name"),
        active: row.get("active"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        modified_by: row.get("modified_by"),
        modified_at: row.get("modified_at"),
        deleted_by: row.get("deleted_by"),
        deleted_at: row.get("deleted_at"),
    }
}

/// Find an active lookup row by natural key. Soft-deleted rows do not
/// participate in resolution.
pub async fn find_lookup(
    conn: &mut SqliteConnection,
    kind: LookupKind,
    code: &str,
    store: &str,
) -> Result<Option<LookupEntity>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT id, code, store, name, active,
               created_by, created_at, modified_by, modified_at, deleted_by, deleted_at
        FROM {} WHERE code = ? AND store = ? AND deleted_at IS NULL
        "#,
        kind.table()
    );
    let row = sqlx::query(&sql)
        .bind(code)
        .bind(store)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|row| lookup_from_row(kind, &row)))
}

pub async fn insert_lookup(
    conn: &mut SqliteConnection,
    entity: &LookupEntity,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO {}
        (id, code, store, name, active,
         created_by, created_at, modified_by, modified_at, deleted_by, deleted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        entity.kind.table()
    );
    sqlx::query(&sql)
        .bind(&entity.id)
        .bind(&entity.code)
        .bind(&entity.store)
        .bind(&entity.name)
        .bind(entity.active)
        .bind(&entity.created_by)
        .bind(entity.created_at)
        .bind(&entity.modified_by)
        .bind(entity.modified_at)
        .bind(&entity.deleted_by)
        .bind(entity.deleted_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn count_lookup_rows(
    conn: &mut SqliteConnection,
    kind: LookupKind,
) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) AS n FROM {}", kind.table());
    let row = sqlx::query(&sql).fetch_one(&mut *conn).await?;
    Ok(row.get("n"))
}

// ===============================
// HIERARCHY TREE (read-only for the importer)
// ===============================

pub async fn hierarchy_node_exists(
    conn: &mut SqliteConnection,
    level: HierarchyLevel,
    id: i64,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM hierarchy_nodes WHERE id = ? AND level = ?")
        .bind(id)
        .bind(level.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Fixture/seed helper; the import engine itself never writes the tree.
pub async fn insert_hierarchy_node(
    conn: &mut SqliteConnection,
    node: &HierarchyNode,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO hierarchy_nodes (id, level, parent_id, name) VALUES (?, ?, ?, ?)")
        .bind(node.id)
        .bind(node.level.as_str())
        .bind(node.parent_id)
        .bind(&node.name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ===============================
// ATTRIBUTES
// ===============================

fn attribute_from_row(row: &SqliteRow) -> Attribute {
    Attribute {
        id: row.get("id"),
        name: row.get("name"),
        store: row.get("store"),
        rank: row.get("rank"),
        as_filter: row.get("as_filter"),
        active: row.get("active"),
        category_id: row.get("category_id"),
        group_id: row.get("group_id"),
        data_type_id: row.get("data_type_id"),
        uom_id: row.get("uom_id"),
        scraped_at: row.get("scraped_at"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        modified_by: row.get("modified_by"),
        modified_at: row.get("modified_at"),
        deleted_by: row.get("deleted_by"),
        deleted_at: row.get("deleted_at"),
    }
}

pub async fn find_attribute(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Attribute>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, name, store, rank, as_filter, active, category_id,
               group_id, data_type_id, uom_id, scraped_at,
               created_by, created_at, modified_by, modified_at, deleted_by, deleted_at
        FROM attributes WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|row| attribute_from_row(&row)))
}

pub async fn insert_attribute(
    conn: &mut SqliteConnection,
    attr: &Attribute,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attributes
        (id, name, store, rank, as_filter, active, category_id,
         group_id, data_type_id, uom_id, scraped_at,
         created_by, created_at, modified_by, modified_at, deleted_by, deleted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(attr.id)
    .bind(&attr.name)
    .bind(&attr.store)
    .bind(attr.rank)
    .bind(attr.as_filter)
    .bind(attr.active)
    .bind(attr.category_id)
    .bind(&attr.group_id)
    .bind(&attr.data_type_id)
    .bind(&attr.uom_id)
    .bind(attr.scraped_at)
    .bind(&attr.created_by)
    .bind(attr.created_at)
    .bind(&attr.modified_by)
    .bind(attr.modified_at)
    .bind(&attr.deleted_by)
    .bind(attr.deleted_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Merge mutable fields into an existing attribute row.
pub async fn update_attribute(
    conn: &mut SqliteConnection,
    attr: &Attribute,
    modified_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE attributes SET
            name = ?, store = ?, rank = ?, as_filter = ?, active = ?,
            group_id = ?, data_type_id = ?, uom_id = ?, scraped_at = ?,
            modified_by = ?, modified_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&attr.name)
    .bind(&attr.store)
    .bind(attr.rank)
    .bind(attr.as_filter)
    .bind(attr.active)
    .bind(&attr.group_id)
    .bind(&attr.data_type_id)
    .bind(&attr.uom_id)
    .bind(attr.scraped_at)
    .bind(&attr.modified_by)
    .bind(modified_at)
    .bind(attr.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ===============================
// FEATURE / BENEFIT RECORDS
// ===============================

fn feature_benefit_from_row(row: &SqliteRow) -> FeatureBenefit {
    let level: String = row.get("source_level");
    let tags: Option<String> = row.get("tags");
    FeatureBenefit {
        id: row.get("id"),
        feature_name: row.get("feature_name"),
        feature_description: row.get("feature_description"),
        benefit_name: row.get("benefit_name"),
        benefit_description: row.get("benefit_description"),
        external_id: row.get("external_id"),
        external_code: row.get("external_code"),
        priority: row.get("priority"),
        category: row.get("category"),
        tags: tags
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        source_level: match level.as_str() {
            "class" => HierarchyLevel::Class,
            "type" => HierarchyLevel::Type,
            _ => HierarchyLevel::Category,
        },
        source_level_id: row.get("source_level_id"),
        is_active: row.get("is_active"),
        scraped_at: row.get("scraped_at"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        modified_by: row.get("modified_by"),
        modified_at: row.get("modified_at"),
        deleted_by: row.get("deleted_by"),
        deleted_at: row.get("deleted_at"),
    }
}

pub async fn find_feature_benefit(
    conn: &mut SqliteConnection,
    level: HierarchyLevel,
    level_id: i64,
    external_id: i64,
) -> Result<Option<FeatureBenefit>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, feature_name, feature_description, benefit_name, benefit_description,
               external_id, external_code, priority, category, tags,
               source_level, source_level_id, is_active, scraped_at,
               created_by, created_at, modified_by, modified_at, deleted_by, deleted_at
        FROM feature_benefits
        WHERE source_level = ? AND source_level_id = ? AND external_id = ?
        "#,
    )
    .bind(level.as_str())
    .bind(level_id)
    .bind(external_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|row| feature_benefit_from_row(&row)))
}

pub async fn insert_feature_benefit(
    conn: &mut SqliteConnection,
    record: &FeatureBenefit,
) -> Result<(), sqlx::Error> {
    let tags = serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".to_string());
    sqlx::query(
        r#"
        INSERT INTO feature_benefits
        (id, feature_name, feature_description, benefit_name, benefit_description,
         external_id, external_code, priority, category, tags,
         source_level, source_level_id, is_active, scraped_at,
         created_by, created_at, modified_by, modified_at, deleted_by, deleted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.feature_name)
    .bind(&record.feature_description)
    .bind(&record.benefit_name)
    .bind(&record.benefit_description)
    .bind(record.external_id)
    .bind(&record.external_code)
    .bind(record.priority)
    .bind(&record.category)
    .bind(tags)
    .bind(record.source_level.as_str())
    .bind(record.source_level_id)
    .bind(record.is_active)
    .bind(record.scraped_at)
    .bind(&record.created_by)
    .bind(record.created_at)
    .bind(&record.modified_by)
    .bind(record.modified_at)
    .bind(&record.deleted_by)
    .bind(record.deleted_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Merge mutable fields into an existing feature/benefit row (matched by
/// storage id).
pub async fn update_feature_benefit(
    conn: &mut SqliteConnection,
    record: &FeatureBenefit,
    modified_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let tags = serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".to_string());
    sqlx::query(
        r#"
        UPDATE feature_benefits SET
            feature_name = ?, feature_description = ?, benefit_name = ?, benefit_description = ?,
            external_code = ?, priority = ?, category = ?, tags = ?,
            is_active = ?, scraped_at = ?, modified_by = ?, modified_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&record.feature_name)
    .bind(&record.feature_description)
    .bind(&record.benefit_name)
    .bind(&record.benefit_description)
    .bind(&record.external_code)
    .bind(record.priority)
    .bind(&record.category)
    .bind(tags)
    .bind(record.is_active)
    .bind(record.scraped_at)
    .bind(&record.modified_by)
    .bind(modified_at)
    .bind(&record.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ===============================
// INTEGRITY VALIDATION
// ===============================

/// Row counts plus orphan checks, mirroring what operators eyeball after an
/// import run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IntegritySummary {
    pub attribute_groups: i64,
    pub data_types: i64,
    pub units_of_measure: i64,
    pub attributes: i64,
    pub feature_benefits: i64,
    pub orphaned_attributes: i64,
    pub orphaned_feature_benefits: i64,
}

pub async fn integrity_summary(pool: &SqlitePool) -> Result<IntegritySummary, sqlx::Error> {
    let mut conn = pool.acquire().await?;

    let mut summary = IntegritySummary {
        attribute_groups: count_lookup_rows(&mut conn, LookupKind::AttributeGroup).await?,
        data_types: count_lookup_rows(&mut conn, LookupKind::DataType).await?,
        units_of_measure: count_lookup_rows(&mut conn, LookupKind::UnitOfMeasure).await?,
        ..IntegritySummary::default()
    };

    let row = sqlx::query("SELECT COUNT(*) AS n FROM attributes")
        .fetch_one(&mut *conn)
        .await?;
    summary.attributes = row.get("n");

    let row = sqlx::query("SELECT COUNT(*) AS n FROM feature_benefits")
        .fetch_one(&mut *conn)
        .await?;
    summary.feature_benefits = row.get("n");

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS n FROM attributes a
        WHERE NOT EXISTS (
            SELECT 1 FROM hierarchy_nodes h WHERE h.id = a.category_id AND h.level = 'category'
        )
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;
    summary.orphaned_attributes = row.get("n");

    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS n FROM feature_benefits f
        WHERE NOT EXISTS (
            SELECT 1 FROM hierarchy_nodes h WHERE h.id = f.source_level_id AND h.level = f.source_level
        )
        "#,
    )
    .fetch_one(&mut *conn)
    .await?;
    summary.orphaned_feature_benefits = row.get("n");

    Ok(summary)
}
