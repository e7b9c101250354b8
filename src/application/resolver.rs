//! Natural-key resolution for embedded lookup sub-objects.
//!
//! The payload repeats the same group/data-type/uom value objects under many
//! attributes; all occurrences must fold onto one shared row per
//! (code, store). Resolution never mutates an existing row.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::domain::entities::{LookupEntity, LookupKind};
use crate::domain::errors::ImportError;
use crate::domain::payload::LookupRecord;
use crate::infrastructure::catalog_store;

/// Resolve-or-create with a per-run cache.
///
/// The cache holds rows observed through the run's own connection, including
/// rows inserted inside a transaction that has not committed yet, so
/// `invalidate` must be called whenever a batch rolls back.
pub struct LookupResolver {
    cache: HashMap<(LookupKind, String, String), LookupEntity>,
}

impl LookupResolver {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    /// Drop all cached entries. Required after a batch rollback: ids minted
    /// inside the aborted transaction no longer exist.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    /// Validate and normalize the natural key of a lookup descriptor. The
    /// embedded sub-object may omit `store`, in which case the owning
    /// attribute's store applies.
    pub fn natural_key(
        kind: LookupKind,
        record: &LookupRecord,
        fallback_store: &str,
    ) -> Result<(String, String), ImportError> {
        let code = record.code.trim();
        if code.is_empty() {
            return Err(ImportError::Validation {
                entity: kind.label().to_string(),
                message: "code is missing".to_string(),
            });
        }
        let store = if record.store.trim().is_empty() {
            fallback_store.trim()
        } else {
            record.store.trim()
        };
        if store.is_empty() {
            return Err(ImportError::Validation {
                entity: kind.label().to_string(),
                message: "store is missing".to_string(),
            });
        }
        Ok((code.to_string(), store.to_string()))
    }

    /// Return the existing entity for the descriptor's natural key, or
    /// create it. The boolean is true when a row was created by this call.
    pub async fn resolve_or_create(
        &mut self,
        conn: &mut SqliteConnection,
        kind: LookupKind,
        record: &LookupRecord,
        fallback_store: &str,
        now: DateTime<Utc>,
    ) -> Result<(LookupEntity, bool), ImportError> {
        let (code, store) = Self::natural_key(kind, record, fallback_store)?;
        let key = (kind, code.clone(), store.clone());

        if let Some(hit) = self.cache.get(&key) {
            return Ok((hit.clone(), false));
        }

        if let Some(existing) = catalog_store::find_lookup(conn, kind, &code, &store).await? {
            self.cache.insert(key, existing.clone());
            return Ok((existing, false));
        }

        let entity = LookupEntity {
            id: Uuid::new_v4().to_string(),
            kind,
            code,
            store,
            name: record.name.clone(),
            active: record.active,
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
        };

        match catalog_store::insert_lookup(conn, &entity).await {
            Ok(()) => {
                debug!(kind = kind.label(), code = %entity.code, store = %entity.store, "created lookup row");
                self.cache.insert(key, entity.clone());
                Ok((entity, true))
            }
            Err(err) if catalog_store::is_unique_violation(&err) => {
                // Lost a creation race against a concurrent writer; the
                // winner's row is authoritative.
                match catalog_store::find_lookup(conn, kind, &entity.code, &entity.store).await? {
                    Some(winner) => {
                        self.cache.insert(key, winner.clone());
                        Ok((winner, false))
                    }
                    None => Err(ImportError::Storage(err)),
                }
            }
            Err(err) => Err(ImportError::Storage(err)),
        }
    }
}

impl Default for LookupResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(code: &str, store: &str) -> LookupRecord {
        LookupRecord {
            code: code.to_string(),
            name: "Text".to_string(),
            store: store.to_string(),
            active: true,
            created_by: None,
            created: None,
            modified_by: None,
            modified: None,
            deleted_by: None,
            deleted: None,
        }
    }

    #[rstest]
    #[case("", "au", "")]
    #[case("  ", "au", "")]
    #[case("txt", "", "")]
    #[case("txt", "  ", " ")]
    fn empty_code_or_store_fails_validation(
        #[case] code: &str,
        #[case] store: &str,
        #[case] fallback: &str,
    ) {
        let err = LookupResolver::natural_key(LookupKind::DataType, &record(code, store), fallback)
            .unwrap_err();
        assert!(err.is_record_level());
    }

    #[test]
    fn natural_key_trims_and_falls_back_to_owner_store() {
        let (code, store) =
            LookupResolver::natural_key(LookupKind::DataType, &record(" txt ", ""), "au").unwrap();
        assert_eq!(code, "txt");
        assert_eq!(store, "au");
    }

    #[test]
    fn explicit_store_wins_over_fallback() {
        let (_, store) =
            LookupResolver::natural_key(LookupKind::DataType, &record("txt", "nz"), "au").unwrap();
        assert_eq!(store, "nz");
    }
}
