//! Source payload shapes as delivered by the scraper.
//!
//! These are deliberately tolerant: optional sub-objects deserialize to
//! `None`, missing flags fall back to sensible defaults, and audit fields are
//! carried through when present. A payload that does not parse at all is a
//! fatal error and nothing is imported from it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::domain::entities::HierarchyLevel;
use crate::domain::errors::ImportError;

fn default_true() -> bool {
    true
}

/// One category entry from the attributes payload, carrying the attributes
/// scraped for that category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryAttributesEntry {
    pub category_id: i64,
    pub scraped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Vec<AttributeRecord>,
}

/// A single attribute as scraped, with its embedded lookup sub-objects.
#[derive(Debug, Clone, Deserialize)]
pub struct AttributeRecord {
    pub id: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub modified_by: Option<String>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by: Option<String>,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub store: String,
    #[serde(default)]
    pub rank: i64,
    #[serde(default)]
    pub attribute_group: Option<LookupRecord>,
    #[serde(default)]
    pub uom: Option<LookupRecord>,
    #[serde(default)]
    pub data_type: Option<LookupRecord>,
    #[serde(default)]
    pub as_filter: bool,
}

/// Embedded lookup sub-object (attribute_group / data_type / uom).
///
/// The same value object appears under many attributes; the resolver folds
/// all occurrences onto one shared row per (code, store).
#[derive(Debug, Clone, Deserialize)]
pub struct LookupRecord {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub store: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_by: Option<String>,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by: Option<String>,
    #[serde(default)]
    pub deleted: Option<DateTime<Utc>>,
}

/// One feature/benefit record from the per-level payload.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureBenefitRecord {
    #[serde(default)]
    pub feature_name: String,
    #[serde(default)]
    pub feature_description: Option<String>,
    #[serde(default)]
    pub benefit_name: Option<String>,
    #[serde(default)]
    pub benefit_description: Option<String>,
    pub external_id: i64,
    #[serde(default)]
    pub external_code: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source_level: HierarchyLevel,
    pub source_level_id: i64,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Parse the attributes payload. Structural failure is fatal.
pub fn parse_attributes_payload(raw: &str) -> Result<Vec<CategoryAttributesEntry>, ImportError> {
    serde_json::from_str(raw).map_err(ImportError::Payload)
}

/// Parse the feature/benefit payload. Structural failure is fatal.
pub fn parse_feature_benefits_payload(raw: &str) -> Result<Vec<FeatureBenefitRecord>, ImportError> {
    serde_json::from_str(raw).map_err(ImportError::Payload)
}

/// One flat row of the attributes CSV export. Lookup sub-objects arrive as
/// code/name column pairs; an empty code means no lookup.
#[derive(Debug, Deserialize)]
struct AttributeCsvRow {
    #[serde(default)]
    category_id: Option<i64>,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    store: String,
    #[serde(default)]
    rank: Option<i64>,
    #[serde(default)]
    as_filter: Option<bool>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    scraped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    attribute_group_code: Option<String>,
    #[serde(default)]
    attribute_group_name: Option<String>,
    #[serde(default)]
    data_type_code: Option<String>,
    #[serde(default)]
    data_type_name: Option<String>,
    #[serde(default)]
    uom_code: Option<String>,
    #[serde(default)]
    uom_name: Option<String>,
}

/// One flat row of the feature/benefit CSV export. The hierarchy level is
/// not a column; each file carries records for exactly one level.
#[derive(Debug, Deserialize)]
struct FeatureBenefitCsvRow {
    #[serde(default)]
    level_id: Option<i64>,
    #[serde(default)]
    external_id: Option<i64>,
    #[serde(default)]
    feature_name: String,
    #[serde(default)]
    feature_description: Option<String>,
    #[serde(default)]
    benefit_name: Option<String>,
    #[serde(default)]
    benefit_description: Option<String>,
    #[serde(default)]
    external_code: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Option<String>,
    #[serde(default)]
    scraped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_active: Option<bool>,
}

fn csv_lookup(code: Option<String>, name: Option<String>) -> Option<LookupRecord> {
    let code = code.unwrap_or_default();
    if code.trim().is_empty() {
        return None;
    }
    Some(LookupRecord {
        code,
        name: name.unwrap_or_default(),
        store: String::new(),
        active: true,
        created_by: None,
        created: None,
        modified_by: None,
        modified: None,
        deleted_by: None,
        deleted: None,
    })
}

/// The tags column holds a JSON array when exported programmatically;
/// hand-edited files use `;`-separated values.
fn csv_tags(raw: Option<&str>) -> Vec<String> {
    let raw = raw.unwrap_or_default().trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if let Ok(tags) = serde_json::from_str(raw) {
        return tags;
    }
    raw.split(';')
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Parse the attributes CSV export into the same shape as the JSON payload,
/// grouping rows by category in first-seen order. Rows without a category id
/// or attribute id are skipped, matching the row-level tolerance of the
/// upstream exports; an unreadable file is fatal.
pub fn parse_attributes_csv(raw: &str) -> Result<Vec<CategoryAttributesEntry>, ImportError> {
    let mut reader = csv::Reader::from_reader(raw.as_bytes());
    let mut entries: Vec<CategoryAttributesEntry> = Vec::new();
    let mut slots: HashMap<i64, usize> = HashMap::new();

    for (row_no, row) in reader.deserialize::<AttributeCsvRow>().enumerate() {
        let row = row?;
        let (Some(category_id), Some(id)) = (row.category_id.filter(|id| *id != 0), row.id) else {
            warn!(row = row_no + 1, "skipping csv row without category_id or id");
            continue;
        };
        let record = AttributeRecord {
            id,
            active: row.active.unwrap_or(true),
            modified_by: None,
            modified: None,
            created_by: None,
            created: None,
            deleted_by: None,
            deleted: None,
            name: row.name,
            store: row.store,
            rank: row.rank.unwrap_or(0),
            attribute_group: csv_lookup(row.attribute_group_code, row.attribute_group_name),
            uom: csv_lookup(row.uom_code, row.uom_name),
            data_type: csv_lookup(row.data_type_code, row.data_type_name),
            as_filter: row.as_filter.unwrap_or(false),
        };
        match slots.get(&category_id) {
            Some(&slot) => entries[slot].attributes.push(record),
            None => {
                slots.insert(category_id, entries.len());
                entries.push(CategoryAttributesEntry {
                    category_id,
                    scraped_at: row.scraped_at,
                    attributes: vec![record],
                });
            }
        }
    }
    Ok(entries)
}

/// Parse a feature/benefit CSV export. Every record takes the given level;
/// rows without a level id or external id are skipped.
pub fn parse_feature_benefits_csv(
    raw: &str,
    level: HierarchyLevel,
) -> Result<Vec<FeatureBenefitRecord>, ImportError> {
    let mut reader = csv::Reader::from_reader(raw.as_bytes());
    let mut records = Vec::new();

    for (row_no, row) in reader.deserialize::<FeatureBenefitCsvRow>().enumerate() {
        let row = row?;
        let (Some(source_level_id), Some(external_id)) =
            (row.level_id.filter(|id| *id != 0), row.external_id)
        else {
            warn!(row = row_no + 1, "skipping csv row without level_id or external_id");
            continue;
        };
        records.push(FeatureBenefitRecord {
            feature_name: row.feature_name,
            feature_description: row.feature_description,
            benefit_name: row.benefit_name,
            benefit_description: row.benefit_description,
            external_id,
            external_code: row.external_code,
            priority: row.priority,
            category: row.category,
            tags: csv_tags(row.tags.as_deref()),
            source_level: level,
            source_level_id,
            scraped_at: row.scraped_at,
            is_active: row.is_active.unwrap_or(true),
        });
    }
    Ok(records)
}
