//! Core catalog entities persisted by the import engine.
//!
//! Lookup entities (attribute groups, data types, units of measure) are
//! shared reference rows keyed by their natural key (code, store). Attributes
//! and feature/benefit records carry the external identifier assigned by the
//! upstream source so repeated imports can find them again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three lookup-entity variants, each stored in its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LookupKind {
    AttributeGroup,
    DataType,
    UnitOfMeasure,
}

impl LookupKind {
    /// Table backing this lookup variant.
    pub fn table(self) -> &'static str {
        match self {
            Self::AttributeGroup => "attribute_groups",
            Self::DataType => "data_types",
            Self::UnitOfMeasure => "units_of_measure",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::AttributeGroup => "attribute group",
            Self::DataType => "data type",
            Self::UnitOfMeasure => "unit of measure",
        }
    }
}

/// A shared reference row resolved by natural key.
///
/// Existing rows are never mutated by the importer so manually curated
/// metadata survives re-imports. Deletion is soft only: a row with a
/// `deleted_at` stamp no longer participates in natural-key resolution but
/// stays queryable for audit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupEntity {
    pub id: String,
    pub kind: LookupKind,
    pub code: String,
    pub store: String,
    pub name: String,
    pub active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Level of a node in the Class → Type → Category classification tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyLevel {
    Class,
    Type,
    Category,
}

impl HierarchyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Type => "type",
            Self::Category => "category",
        }
    }
}

impl std::fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node of the pre-existing classification tree.
///
/// The import engine only reads this table; attributes and feature/benefit
/// records attach to it but never modify its structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: i64,
    pub level: HierarchyLevel,
    pub parent_id: Option<i64>,
    pub name: Option<String>,
}

/// A category attribute keyed by the external id from the source system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// External id from the source system, used as the primary key so rows
    /// stay traceable across systems.
    pub id: i64,
    pub name: String,
    pub store: String,
    pub rank: i64,
    pub as_filter: bool,
    pub active: bool,
    pub category_id: i64,
    pub group_id: Option<String>,
    pub data_type_id: Option<String>,
    pub uom_id: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Attribute {
    /// True when any field the importer is allowed to merge differs from
    /// `other`. Audit stamps are excluded on purpose.
    pub fn differs_from(&self, other: &Attribute) -> bool {
        self.name != other.name
            || self.store != other.store
            || self.rank != other.rank
            || self.as_filter != other.as_filter
            || self.active != other.active
            || self.group_id != other.group_id
            || self.data_type_id != other.data_type_id
            || self.uom_id != other.uom_id
            || self.scraped_at != other.scraped_at
    }
}

/// A feature/benefit record attached to one level of the hierarchy.
///
/// Uniqueness is the compound key (source_level, source_level_id,
/// external_id): the same upstream record must never be imported twice under
/// the same parent node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBenefit {
    pub id: String,
    pub feature_name: String,
    pub feature_description: Option<String>,
    pub benefit_name: Option<String>,
    pub benefit_description: Option<String>,
    pub external_id: i64,
    pub external_code: Option<String>,
    pub priority: Option<i64>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub source_level: HierarchyLevel,
    pub source_level_id: i64,
    pub is_active: bool,
    pub scraped_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_by: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FeatureBenefit {
    pub fn differs_from(&self, other: &FeatureBenefit) -> bool {
        self.feature_name != other.feature_name
            || self.feature_description != other.feature_description
            || self.benefit_name != other.benefit_name
            || self.benefit_description != other.benefit_description
            || self.external_code != other.external_code
            || self.priority != other.priority
            || self.category != other.category
            || self.tags != other.tags
            || self.is_active != other.is_active
            || self.scraped_at != other.scraped_at
    }
}
