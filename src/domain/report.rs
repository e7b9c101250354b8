//! Import run accounting.
//!
//! Every upsert produces a tagged outcome; the report accumulates them per
//! entity kind and keeps a bounded sample of rejected records so operators
//! can fix the source data and re-run without re-processing what already
//! succeeded.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

/// Result of one upsert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    /// Row did not exist and was inserted.
    Created,
    /// Row existed with differing mutable fields; merged in place.
    Updated,
    /// Row existed and nothing differed.
    Skipped,
    /// Record could not be persisted (missing parent, failed validation,
    /// storage failure that survived the individual retry).
    Rejected,
}

/// Entity kinds tracked by the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    AttributeGroup,
    DataType,
    UnitOfMeasure,
    Attribute,
    FeatureBenefit,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::AttributeGroup => "attribute_group",
            Self::DataType => "data_type",
            Self::UnitOfMeasure => "unit_of_measure",
            Self::Attribute => "attribute",
            Self::FeatureBenefit => "feature_benefit",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OutcomeCounts {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub rejected: u64,
}

impl OutcomeCounts {
    pub fn total(&self) -> u64 {
        self.created + self.updated + self.skipped + self.rejected
    }
}

/// One rejected record kept for the operator-facing summary.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub kind: EntityKind,
    pub external_id: String,
    pub reason: String,
}

/// Aggregated counts for a whole run. Purely additive; never touches the
/// data store.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    counts: BTreeMap<EntityKind, OutcomeCounts>,
    rejected_samples: Vec<RejectedRecord>,
    rejected_sample_limit: usize,
    /// Rejections beyond the sample limit are counted but not retained.
    rejected_overflow: u64,
}

impl ImportReport {
    pub fn new(rejected_sample_limit: usize) -> Self {
        Self {
            counts: BTreeMap::new(),
            rejected_samples: Vec::new(),
            rejected_sample_limit,
            rejected_overflow: 0,
        }
    }

    pub fn record(&mut self, kind: EntityKind, outcome: UpsertOutcome) {
        let counts = self.counts.entry(kind).or_default();
        match outcome {
            UpsertOutcome::Created => counts.created += 1,
            UpsertOutcome::Updated => counts.updated += 1,
            UpsertOutcome::Skipped => counts.skipped += 1,
            UpsertOutcome::Rejected => counts.rejected += 1,
        }
    }

    pub fn record_rejected(
        &mut self,
        kind: EntityKind,
        external_id: impl Into<String>,
        reason: impl Into<String>,
    ) {
        self.record(kind, UpsertOutcome::Rejected);
        if self.rejected_samples.len() < self.rejected_sample_limit {
            self.rejected_samples.push(RejectedRecord {
                kind,
                external_id: external_id.into(),
                reason: reason.into(),
            });
        } else {
            self.rejected_overflow += 1;
        }
    }

    pub fn counts(&self, kind: EntityKind) -> OutcomeCounts {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    pub fn rejected_samples(&self) -> &[RejectedRecord] {
        &self.rejected_samples
    }

    pub fn total_created(&self) -> u64 {
        self.counts.values().map(|c| c.created).sum()
    }

    pub fn total_rejected(&self) -> u64 {
        self.counts.values().map(|c| c.rejected).sum()
    }

    /// Fold another report into this one (used when one CLI invocation runs
    /// several payload files).
    pub fn merge(&mut self, other: &ImportReport) {
        for (kind, counts) in &other.counts {
            let entry = self.counts.entry(*kind).or_default();
            entry.created += counts.created;
            entry.updated += counts.updated;
            entry.skipped += counts.skipped;
            entry.rejected += counts.rejected;
        }
        for sample in &other.rejected_samples {
            if self.rejected_samples.len() < self.rejected_sample_limit {
                self.rejected_samples.push(sample.clone());
            } else {
                self.rejected_overflow += 1;
            }
        }
        self.rejected_overflow += other.rejected_overflow;
    }

    /// Emit the operator-facing summary on the log channel.
    pub fn log_summary(&self) {
        for (kind, counts) in &self.counts {
            info!(
                entity = kind.label(),
                created = counts.created,
                updated = counts.updated,
                skipped = counts.skipped,
                rejected = counts.rejected,
                "import outcome"
            );
        }
        for sample in &self.rejected_samples {
            warn!(
                entity = sample.kind.label(),
                external_id = %sample.external_id,
                reason = %sample.reason,
                "rejected record"
            );
        }
        if self.rejected_overflow > 0 {
            warn!(
                more = self.rejected_overflow,
                "additional rejected records not sampled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_accumulate_per_kind() {
        let mut report = ImportReport::new(10);
        report.record(EntityKind::Attribute, UpsertOutcome::Created);
        report.record(EntityKind::Attribute, UpsertOutcome::Created);
        report.record(EntityKind::Attribute, UpsertOutcome::Skipped);
        report.record(EntityKind::DataType, UpsertOutcome::Created);

        let attr = report.counts(EntityKind::Attribute);
        assert_eq!(attr.created, 2);
        assert_eq!(attr.skipped, 1);
        assert_eq!(report.counts(EntityKind::DataType).created, 1);
        assert_eq!(report.counts(EntityKind::UnitOfMeasure).total(), 0);
        assert_eq!(report.total_created(), 3);
    }

    #[test]
    fn rejected_samples_are_bounded() {
        let mut report = ImportReport::new(2);
        for id in 0..5 {
            report.record_rejected(EntityKind::FeatureBenefit, id.to_string(), "missing parent");
        }
        assert_eq!(report.rejected_samples().len(), 2);
        assert_eq!(report.total_rejected(), 5);
    }

    #[test]
    fn merge_adds_counts_and_respects_sample_cap() {
        let mut a = ImportReport::new(3);
        a.record_rejected(EntityKind::Attribute, "1", "x");
        let mut b = ImportReport::new(3);
        b.record(EntityKind::Attribute, UpsertOutcome::Created);
        b.record_rejected(EntityKind::Attribute, "2", "y");
        b.record_rejected(EntityKind::Attribute, "3", "z");
        b.record_rejected(EntityKind::Attribute, "4", "w");

        a.merge(&b);
        let counts = a.counts(EntityKind::Attribute);
        assert_eq!(counts.created, 1);
        assert_eq!(counts.rejected, 4);
        assert_eq!(a.rejected_samples().len(), 3);
    }
}
