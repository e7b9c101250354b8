//! CLI driver for catalog imports.
//!
//! Usage:
//!   ctc-catalog-import import-attributes <payload.json>
//!   ctc-catalog-import import-features <payload.json>
//!   ctc-catalog-import validate
//!
//! Configuration is read from `import_config.json` in the working directory
//! when present (override with `CTC_IMPORT_CONFIG`).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use ctc_catalog_import::domain::entities::HierarchyLevel;
use ctc_catalog_import::domain::payload;
use ctc_catalog_import::infrastructure::logging;
use ctc_catalog_import::{DatabaseConnection, ImportConfig, ImportEngine};

fn print_usage() {
    println!("CTC Catalog Import");
    println!("Usage:");
    println!("  ctc-catalog-import import-attributes <payload.json|payload.csv>");
    println!("  ctc-catalog-import import-features <payload.json>");
    println!("  ctc-catalog-import import-features <payload.csv> <class|type|category>");
    println!("  ctc-catalog-import validate");
}

fn is_csv(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn parse_level(raw: &str) -> Result<HierarchyLevel> {
    match raw {
        "class" => Ok(HierarchyLevel::Class),
        "type" => Ok(HierarchyLevel::Type),
        "category" => Ok(HierarchyLevel::Category),
        other => anyhow::bail!("unknown hierarchy level: {other}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        print_usage();
        return Ok(());
    };

    let config_path =
        std::env::var("CTC_IMPORT_CONFIG").unwrap_or_else(|_| "import_config.json".to_string());
    let config = ImportConfig::load_or_default(&config_path).await?;
    logging::init_logging_with_config(&config.logging)?;

    let db = DatabaseConnection::new_with_timeout(
        &config.database_url,
        Duration::from_secs(config.acquire_timeout_seconds),
    )
    .await
    .with_context(|| format!("failed to open database {}", config.database_url))?;
    db.migrate().await.context("schema migration failed")?;

    let engine = ImportEngine::new(db.pool().clone(), config);

    // Ctrl-C stops the run at the next batch boundary; committed batches
    // stay committed and the partial report is still printed.
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested, finishing current batch");
            cancel.cancel();
        }
    });

    match command.as_str() {
        "import-attributes" => {
            let Some(path) = args.get(2) else {
                print_usage();
                anyhow::bail!("import-attributes requires a payload file");
            };
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read payload file {path}"))?;
            let entries = if is_csv(path) {
                payload::parse_attributes_csv(&raw)?
            } else {
                payload::parse_attributes_payload(&raw)?
            };
            let report = engine.import_attributes(entries).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "import-features" => {
            let Some(path) = args.get(2) else {
                print_usage();
                anyhow::bail!("import-features requires a payload file");
            };
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read payload file {path}"))?;
            let records = if is_csv(path) {
                // CSV exports carry one hierarchy level per file
                let Some(level) = args.get(3) else {
                    print_usage();
                    anyhow::bail!("importing a features csv requires a hierarchy level");
                };
                payload::parse_feature_benefits_csv(&raw, parse_level(level)?)?
            } else {
                payload::parse_feature_benefits_payload(&raw)?
            };
            let report = engine.import_feature_benefits(records).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "validate" => {
            let summary = engine.validate_integrity().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        other => {
            error!(command = other, "unknown command");
            print_usage();
            anyhow::bail!("unknown command: {other}");
        }
    }

    Ok(())
}
