// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::new_with_timeout(database_url, Duration::from_secs(30)).await
    }

    /// Connect with a caller-supplied acquire timeout so no database
    /// operation in the import run can block indefinitely.
    pub async fn new_with_timeout(database_url: &str, acquire_timeout: Duration) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                std::fs::File::create(db_path)?;
            }
        }

        // A single import run owns its connection; a couple of spares cover
        // the individual-record retry path.
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        // One table per lookup variant, identical shape. The partial unique
        // index keeps the natural key unique among live rows while letting
        // soft-deleted history stay in place.
        for table in ["attribute_groups", "data_types", "units_of_measure"] {
            let create_sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    code TEXT NOT NULL,
                    store TEXT NOT NULL,
                    name TEXT NOT NULL,
                    active INTEGER NOT NULL DEFAULT 1,
                    created_by TEXT,
                    created_at DATETIME NOT NULL,
                    modified_by TEXT,
                    modified_at DATETIME NOT NULL,
                    deleted_by TEXT,
                    deleted_at DATETIME
                )
                "#
            );
            let index_sql = format!(
                r#"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_natural_key
                ON {table} (code, store) WHERE deleted_at IS NULL
                "#
            );
            sqlx::query(&create_sql).execute(&self.pool).await?;
            sqlx::query(&index_sql).execute(&self.pool).await?;
        }

        let create_hierarchy_sql = r#"
            CREATE TABLE IF NOT EXISTS hierarchy_nodes (
                id INTEGER PRIMARY KEY,
                level TEXT NOT NULL CHECK (level IN ('class', 'type', 'category')),
                parent_id INTEGER,
                name TEXT,
                FOREIGN KEY (parent_id) REFERENCES hierarchy_nodes (id)
            )
        "#;

        let create_attributes_sql = r#"
            CREATE TABLE IF NOT EXISTS attributes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                store TEXT NOT NULL,
                rank INTEGER NOT NULL DEFAULT 0,
                as_filter INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                category_id INTEGER NOT NULL,
                group_id TEXT,
                data_type_id TEXT,
                uom_id TEXT,
                scraped_at DATETIME NOT NULL,
                created_by TEXT,
                created_at DATETIME NOT NULL,
                modified_by TEXT,
                modified_at DATETIME NOT NULL,
                deleted_by TEXT,
                deleted_at DATETIME,
                FOREIGN KEY (category_id) REFERENCES hierarchy_nodes (id),
                FOREIGN KEY (group_id) REFERENCES attribute_groups (id),
                FOREIGN KEY (data_type_id) REFERENCES data_types (id),
                FOREIGN KEY (uom_id) REFERENCES units_of_measure (id)
            )
        "#;

        let create_feature_benefits_sql = r#"
            CREATE TABLE IF NOT EXISTS feature_benefits (
                id TEXT PRIMARY KEY,
                feature_name TEXT NOT NULL,
                feature_description TEXT,
                benefit_name TEXT,
                benefit_description TEXT,
                external_id INTEGER NOT NULL,
                external_code TEXT,
                priority INTEGER,
                category TEXT,
                tags TEXT,
                source_level TEXT NOT NULL CHECK (source_level IN ('class', 'type', 'category')),
                source_level_id INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                scraped_at DATETIME NOT NULL,
                created_by TEXT,
                created_at DATETIME NOT NULL,
                modified_by TEXT,
                modified_at DATETIME NOT NULL,
                deleted_by TEXT,
                deleted_at DATETIME,
                FOREIGN KEY (source_level_id) REFERENCES hierarchy_nodes (id)
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_hierarchy_nodes_level ON hierarchy_nodes (level);
            CREATE INDEX IF NOT EXISTS idx_attributes_category_id ON attributes (category_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_feature_benefits_source_key
                ON feature_benefits (source_level, source_level_id, external_id);
            CREATE INDEX IF NOT EXISTS idx_feature_benefits_level ON feature_benefits (source_level);
        "#;

        sqlx::query(create_hierarchy_sql).execute(&self.pool).await?;
        sqlx::query(create_attributes_sql).execute(&self.pool).await?;
        sqlx::query(create_feature_benefits_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}
