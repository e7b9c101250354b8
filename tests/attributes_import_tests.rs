//! End-to-end tests for the category → attributes import path.

use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

use ctc_catalog_import::domain::entities::{HierarchyLevel, HierarchyNode, LookupKind};
use ctc_catalog_import::domain::payload::{parse_attributes_csv, parse_attributes_payload};
use ctc_catalog_import::infrastructure::catalog_store;
use ctc_catalog_import::{DatabaseConnection, EntityKind, ImportConfig, ImportEngine};

async fn setup(batch_size: usize) -> (TempDir, ImportEngine, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("catalog.db").display());
    let db = DatabaseConnection::new(&url).await.unwrap();
    db.migrate().await.unwrap();
    let pool = db.pool().clone();

    // Pre-existing classification tree: class 1 → type 10 → categories 165, 166
    let nodes = [
        HierarchyNode {
            id: 1,
            level: HierarchyLevel::Class,
            parent_id: None,
            name: Some("Hardware".to_string()),
        },
        HierarchyNode {
            id: 10,
            level: HierarchyLevel::Type,
            parent_id: Some(1),
            name: Some("Fasteners".to_string()),
        },
        HierarchyNode {
            id: 165,
            level: HierarchyLevel::Category,
            parent_id: Some(10),
            name: Some("Screws".to_string()),
        },
        HierarchyNode {
            id: 166,
            level: HierarchyLevel::Category,
            parent_id: Some(10),
            name: Some("Bolts".to_string()),
        },
    ];
    let mut conn = pool.acquire().await.unwrap();
    for node in &nodes {
        catalog_store::insert_hierarchy_node(&mut conn, node)
            .await
            .unwrap();
    }
    drop(conn);

    let mut config = ImportConfig::default();
    config.batch.batch_size = batch_size;
    let engine = ImportEngine::new(pool.clone(), config);
    (dir, engine, pool)
}

fn finish_colour_payload() -> &'static str {
    r#"[
        {
            "category_id": 165,
            "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [
                {
                    "id": 5302,
                    "active": true,
                    "name": "Finish Colour",
                    "store": "au",
                    "rank": 3,
                    "attribute_group": null,
                    "uom": null,
                    "data_type": { "code": "txt", "name": "Text", "store": "au" },
                    "as_filter": false
                }
            ]
        }
    ]"#
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) AS n FROM {table}");
    sqlx::query(&sql).fetch_one(pool).await.unwrap().get("n")
}

#[tokio::test]
async fn first_run_creates_second_run_skips() {
    let (_dir, engine, pool) = setup(200).await;
    let entries = parse_attributes_payload(finish_colour_payload()).unwrap();

    let report = engine.import_attributes(entries.clone()).await.unwrap();
    assert_eq!(report.counts(EntityKind::DataType).created, 1);
    assert_eq!(report.counts(EntityKind::Attribute).created, 1);
    assert_eq!(report.counts(EntityKind::AttributeGroup).created, 0);
    assert_eq!(report.counts(EntityKind::UnitOfMeasure).created, 0);

    let row = sqlx::query("SELECT name, rank, data_type_id, group_id, uom_id FROM attributes WHERE id = 5302")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("name"), "Finish Colour");
    assert_eq!(row.get::<i64, _>("rank"), 3);
    assert!(row.get::<Option<String>, _>("data_type_id").is_some());
    assert!(row.get::<Option<String>, _>("group_id").is_none());
    assert!(row.get::<Option<String>, _>("uom_id").is_none());

    // identical re-run: nothing created, attribute skipped, lookup silently resolved
    let rerun = engine.import_attributes(entries).await.unwrap();
    assert_eq!(rerun.total_created(), 0);
    assert_eq!(rerun.counts(EntityKind::Attribute).skipped, 1);
    assert_eq!(rerun.counts(EntityKind::DataType).created, 0);

    assert_eq!(count(&pool, "attributes").await, 1);
    assert_eq!(count(&pool, "data_types").await, 1);
}

#[tokio::test]
async fn missing_category_rejects_attribute_without_side_effects() {
    let (_dir, engine, pool) = setup(200).await;
    let raw = r#"[
        {
            "category_id": 999,
            "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [
                {"id": 7777, "name": "Orphan", "store": "au", "data_type": {"code": "txt", "name": "Text"}}
            ]
        }
    ]"#;

    let report = engine
        .import_attributes(parse_attributes_payload(raw).unwrap())
        .await
        .unwrap();

    assert_eq!(report.counts(EntityKind::Attribute).rejected, 1);
    let sample = &report.rejected_samples()[0];
    assert_eq!(sample.external_id, "7777");
    assert!(sample.reason.contains("not found"));

    assert_eq!(count(&pool, "attributes").await, 0);
    // parent is checked before lookup resolution; no stray lookup rows
    assert_eq!(count(&pool, "data_types").await, 0);
}

#[tokio::test]
async fn null_lookups_yield_null_foreign_keys() {
    let (_dir, engine, pool) = setup(200).await;
    let raw = r#"[
        {
            "category_id": 165,
            "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [
                {"id": 601, "name": "Bare", "store": "au", "attribute_group": null, "uom": null, "data_type": null}
            ]
        }
    ]"#;

    let report = engine
        .import_attributes(parse_attributes_payload(raw).unwrap())
        .await
        .unwrap();
    assert_eq!(report.counts(EntityKind::Attribute).created, 1);

    let row = sqlx::query("SELECT group_id, data_type_id, uom_id FROM attributes WHERE id = 601")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert!(row.get::<Option<String>, _>("group_id").is_none());
    assert!(row.get::<Option<String>, _>("data_type_id").is_none());
    assert!(row.get::<Option<String>, _>("uom_id").is_none());
}

#[tokio::test]
async fn changed_rank_merges_in_place() {
    let (_dir, engine, pool) = setup(200).await;
    let entries = parse_attributes_payload(finish_colour_payload()).unwrap();
    engine.import_attributes(entries).await.unwrap();

    let changed = finish_colour_payload().replace(r#""rank": 3"#, r#""rank": 7"#);
    let report = engine
        .import_attributes(parse_attributes_payload(&changed).unwrap())
        .await
        .unwrap();
    assert_eq!(report.counts(EntityKind::Attribute).updated, 1);
    assert_eq!(report.counts(EntityKind::Attribute).created, 0);

    let row = sqlx::query("SELECT name, rank FROM attributes WHERE id = 5302")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("rank"), 7);
    assert_eq!(row.get::<String, _>("name"), "Finish Colour");
    assert_eq!(count(&pool, "attributes").await, 1);
}

#[tokio::test]
async fn shared_data_type_resolves_to_one_row() {
    let (_dir, engine, pool) = setup(200).await;
    let raw = r#"[
        {
            "category_id": 165,
            "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [
                {"id": 1, "name": "A", "store": "au", "data_type": {"code": "txt", "name": "Text"}}
            ]
        },
        {
            "category_id": 166,
            "scraped_at": "2026-08-01T10:20:00Z",
            "attributes": [
                {"id": 2, "name": "B", "store": "au", "data_type": {"code": "txt", "name": "Text"}}
            ]
        }
    ]"#;

    let report = engine
        .import_attributes(parse_attributes_payload(raw).unwrap())
        .await
        .unwrap();
    assert_eq!(report.counts(EntityKind::DataType).created, 1);
    assert_eq!(report.counts(EntityKind::Attribute).created, 2);
    assert_eq!(count(&pool, "data_types").await, 1);

    // both attributes share the same foreign key
    let rows = sqlx::query("SELECT DISTINCT data_type_id FROM attributes")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn malformed_lookup_rejects_dependent_attribute() {
    let (_dir, engine, pool) = setup(200).await;
    let raw = r#"[
        {
            "category_id": 165,
            "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [
                {"id": 900, "name": "Bad lookup", "store": "au", "data_type": {"code": "", "name": "Nameless"}}
            ]
        }
    ]"#;

    let report = engine
        .import_attributes(parse_attributes_payload(raw).unwrap())
        .await
        .unwrap();

    assert_eq!(report.counts(EntityKind::Attribute).rejected, 1);
    assert!(report.rejected_samples()[0].reason.contains("code is missing"));
    assert_eq!(count(&pool, "attributes").await, 0);
    assert_eq!(count(&pool, "data_types").await, 0);
}

#[tokio::test]
async fn duplicate_external_id_in_one_payload_last_wins() {
    let (_dir, engine, pool) = setup(200).await;
    let raw = r#"[
        {
            "category_id": 165,
            "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [
                {"id": 42, "name": "Twice", "store": "au", "rank": 1},
                {"id": 42, "name": "Twice", "store": "au", "rank": 9}
            ]
        }
    ]"#;

    let report = engine
        .import_attributes(parse_attributes_payload(raw).unwrap())
        .await
        .unwrap();
    assert_eq!(report.counts(EntityKind::Attribute).created, 1);
    assert_eq!(report.counts(EntityKind::Attribute).updated, 1);

    assert_eq!(count(&pool, "attributes").await, 1);
    let row = sqlx::query("SELECT rank FROM attributes WHERE id = 42")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.get::<i64, _>("rank"), 9);
}

#[tokio::test]
async fn small_batches_commit_everything() {
    let (_dir, engine, pool) = setup(2).await;
    let raw = r#"[
        {
            "category_id": 165,
            "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [
                {"id": 1, "name": "A", "store": "au"},
                {"id": 2, "name": "B", "store": "au"},
                {"id": 3, "name": "C", "store": "au"},
                {"id": 4, "name": "D", "store": "au"},
                {"id": 5, "name": "E", "store": "au"}
            ]
        }
    ]"#;

    let report = engine
        .import_attributes(parse_attributes_payload(raw).unwrap())
        .await
        .unwrap();
    assert_eq!(report.counts(EntityKind::Attribute).created, 5);
    assert_eq!(count(&pool, "attributes").await, 5);
}

#[tokio::test]
async fn failed_batch_retries_records_individually() {
    let (_dir, engine, pool) = setup(10).await;
    // Simulate a storage fault that hits exactly one record mid-batch.
    sqlx::query(
        "CREATE TRIGGER block_attribute_666 BEFORE INSERT ON attributes \
         WHEN NEW.id = 666 BEGIN SELECT RAISE(ABORT, 'simulated storage fault'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let raw = r#"[
        {
            "category_id": 165,
            "scraped_at": "2026-08-01T10:15:00Z",
            "attributes": [
                {"id": 1, "name": "A", "store": "au", "data_type": {"code": "txt", "name": "Text"}},
                {"id": 666, "name": "Cursed", "store": "au"},
                {"id": 2, "name": "B", "store": "au", "data_type": {"code": "txt", "name": "Text"}}
            ]
        }
    ]"#;

    let report = engine
        .import_attributes(parse_attributes_payload(raw).unwrap())
        .await
        .unwrap();

    // the whole batch rolled back, then each record ran alone: the healthy
    // two commit, the faulty one is rejected with the storage error
    assert_eq!(report.counts(EntityKind::Attribute).created, 2);
    assert_eq!(report.counts(EntityKind::Attribute).rejected, 1);
    let sample = &report.rejected_samples()[0];
    assert_eq!(sample.external_id, "666");
    assert!(sample.reason.contains("simulated storage fault"));

    assert_eq!(count(&pool, "attributes").await, 2);
    let missing = sqlx::query("SELECT 1 FROM attributes WHERE id = 666")
        .fetch_optional(&pool)
        .await
        .unwrap();
    assert!(missing.is_none());

    // the lookup minted in the aborted transaction was re-created exactly
    // once after the resolver cache flush
    assert_eq!(count(&pool, "data_types").await, 1);
    assert_eq!(report.counts(EntityKind::DataType).created, 1);
}

#[tokio::test]
async fn csv_payload_imports_like_json() {
    let (_dir, engine, pool) = setup(200).await;
    let raw = "category_id,id,name,store,rank,scraped_at,data_type_code,data_type_name\n\
               165,5302,Finish Colour,au,3,2026-08-01T10:15:00Z,txt,Text\n";
    let entries = parse_attributes_csv(raw).unwrap();

    let report = engine.import_attributes(entries.clone()).await.unwrap();
    assert_eq!(report.counts(EntityKind::Attribute).created, 1);
    assert_eq!(report.counts(EntityKind::DataType).created, 1);

    let row = sqlx::query("SELECT name, rank, data_type_id FROM attributes WHERE id = 5302")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("name"), "Finish Colour");
    assert_eq!(row.get::<i64, _>("rank"), 3);
    assert!(row.get::<Option<String>, _>("data_type_id").is_some());

    let rerun = engine.import_attributes(entries).await.unwrap();
    assert_eq!(rerun.total_created(), 0);
    assert_eq!(rerun.counts(EntityKind::Attribute).skipped, 1);
}

#[tokio::test]
async fn natural_key_collision_is_prevented_by_schema() {
    let (_dir, _engine, pool) = setup(200).await;

    // two inserts with the same (code, store) must violate the partial
    // unique index guarding the natural key
    let mut conn = pool.acquire().await.unwrap();
    let now = chrono::Utc::now();
    let entity = ctc_catalog_import::domain::entities::LookupEntity {
        id: "one".to_string(),
        kind: LookupKind::DataType,
        code: "txt".to_string(),
        store: "au".to_string(),
        name: "Text".to_string(),
        active: true,
        created_by: None,
        created_at: now,
        modified_by: None,
        modified_at: now,
        deleted_by: None,
        deleted_at: None,
    };
    catalog_store::insert_lookup(&mut conn, &entity).await.unwrap();

    let mut duplicate = entity.clone();
    duplicate.id = "two".to_string();
    let err = catalog_store::insert_lookup(&mut conn, &duplicate)
        .await
        .unwrap_err();
    assert!(catalog_store::is_unique_violation(&err));
}
