//! Payload traversal in dependency order.
//!
//! The walker flattens the nested source payload into a sequence of import
//! operations. Ordering is fixed so re-runs are deterministic: attributes
//! follow the payload's category order, feature/benefit records are grouped
//! class → type → category. When the same external id appears twice in one
//! payload, the later occurrence wins by position.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::payload::{AttributeRecord, CategoryAttributesEntry, FeatureBenefitRecord};
use crate::domain::report::EntityKind;

/// One unit of work for the batch commit controller.
#[derive(Debug, Clone)]
pub enum ImportOp {
    Attribute {
        category_id: i64,
        scraped_at: DateTime<Utc>,
        record: AttributeRecord,
    },
    FeatureBenefit { record: FeatureBenefitRecord },
}

impl ImportOp {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Attribute { .. } => EntityKind::Attribute,
            Self::FeatureBenefit { .. } => EntityKind::FeatureBenefit,
        }
    }

    /// External id used when reporting a rejection for this operation.
    pub fn external_id(&self) -> String {
        match self {
            Self::Attribute { record, .. } => record.id.to_string(),
            Self::FeatureBenefit { record } => record.external_id.to_string(),
        }
    }
}

/// Flatten the attributes payload, category entry by category entry. A
/// category entry without a scrape timestamp stamps its attributes with the
/// run time.
pub fn plan_attribute_ops(
    entries: Vec<CategoryAttributesEntry>,
    run_started_at: DateTime<Utc>,
) -> Vec<ImportOp> {
    let mut ops = Vec::new();
    for entry in entries {
        debug!(
            category_id = entry.category_id,
            attributes = entry.attributes.len(),
            "planning category attributes"
        );
        let scraped_at = entry.scraped_at.unwrap_or(run_started_at);
        for record in entry.attributes {
            ops.push(ImportOp::Attribute {
                category_id: entry.category_id,
                scraped_at,
                record,
            });
        }
    }
    ops
}

/// Order feature/benefit records class → type → category, keeping payload
/// order within each level.
pub fn plan_feature_benefit_ops(mut records: Vec<FeatureBenefitRecord>) -> Vec<ImportOp> {
    records.sort_by_key(|record| record.source_level);
    records
        .into_iter()
        .map(|record| ImportOp::FeatureBenefit { record })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::HierarchyLevel;
    use crate::domain::payload::{parse_attributes_payload, parse_feature_benefits_payload};

    #[test]
    fn attribute_ops_keep_payload_order() {
        let raw = r#"[
            {"category_id": 1, "scraped_at": null, "attributes": [{"id": 10}, {"id": 11}]},
            {"category_id": 2, "scraped_at": null, "attributes": [{"id": 20}]}
        ]"#;
        let ops = plan_attribute_ops(parse_attributes_payload(raw).unwrap(), Utc::now());
        let ids: Vec<String> = ops.iter().map(ImportOp::external_id).collect();
        assert_eq!(ids, vec!["10", "11", "20"]);
    }

    #[test]
    fn missing_scrape_time_falls_back_to_run_time() {
        let raw = r#"[{"category_id": 1, "scraped_at": null, "attributes": [{"id": 10}]}]"#;
        let run_started_at = Utc::now();
        let ops = plan_attribute_ops(parse_attributes_payload(raw).unwrap(), run_started_at);
        match &ops[0] {
            ImportOp::Attribute { scraped_at, .. } => assert_eq!(*scraped_at, run_started_at),
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn feature_benefit_ops_are_grouped_class_type_category() {
        let raw = r#"[
            {"external_id": 1, "source_level": "category", "source_level_id": 165},
            {"external_id": 2, "source_level": "class", "source_level_id": 1},
            {"external_id": 3, "source_level": "type", "source_level_id": 10},
            {"external_id": 4, "source_level": "class", "source_level_id": 2}
        ]"#;
        let ops = plan_feature_benefit_ops(parse_feature_benefits_payload(raw).unwrap());
        let levels: Vec<HierarchyLevel> = ops
            .iter()
            .map(|op| match op {
                ImportOp::FeatureBenefit { record } => record.source_level,
                other => panic!("unexpected op {other:?}"),
            })
            .collect();
        assert_eq!(
            levels,
            vec![
                HierarchyLevel::Class,
                HierarchyLevel::Class,
                HierarchyLevel::Type,
                HierarchyLevel::Category
            ]
        );
        // stable within a level: class 2 stays behind class 1
        assert_eq!(ops[0].external_id(), "2");
        assert_eq!(ops[1].external_id(), "4");
    }
}
