//! Desired migrations and their checksums.

use std::collections::HashMap;

use md5::{Digest, Md5};

use crate::error::{MigrateError, Result};

/// A migration the operator wants applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Unique identifier, stable across runs (e.g. "0002_create_users").
    pub id: String,
    /// Forward SQL.
    pub script: String,
    /// SQL that undoes `script`. Stored in the changelog at apply time.
    pub revert_script: String,
    /// Digest of `script`, see [`checksum`].
    pub checksum: String,
}

impl Migration {
    /// Create a migration, computing the checksum from the forward script.
    pub fn new(
        id: impl Into<String>,
        script: impl Into<String>,
        revert_script: impl Into<String>,
    ) -> Self {
        let script = script.into();
        let checksum = checksum(&script);
        Self {
            id: id.into(),
            script,
            revert_script: revert_script.into(),
            checksum,
        }
    }

    /// Create a migration with a precomputed checksum.
    pub fn with_checksum(
        id: impl Into<String>,
        script: impl Into<String>,
        revert_script: impl Into<String>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            script: script.into(),
            revert_script: revert_script.into(),
            checksum: checksum.into(),
        }
    }
}

/// Canonical checksum of a forward script: lower-case hex MD5 of its exact bytes.
///
/// This value is persisted in the changelog and compared on every run, so the
/// encoding must never change.
pub fn checksum(script: &str) -> String {
    format!("{:x}", Md5::digest(script.as_bytes()))
}

/// The desired migration set: declared order plus O(1) lookup by id.
#[derive(Debug, Clone, Default)]
pub struct DesiredSet {
    order: Vec<String>,
    by_id: HashMap<String, Migration>,
}

impl DesiredSet {
    /// Build from migrations in declared order.
    ///
    /// Rejects empty and duplicate ids.
    pub fn new(migrations: Vec<Migration>) -> Result<Self> {
        let mut order = Vec::with_capacity(migrations.len());
        let mut by_id = HashMap::with_capacity(migrations.len());

        for migration in migrations {
            if migration.id.trim().is_empty() {
                return Err(MigrateError::Load("Migration id must not be empty".into()));
            }
            if by_id.contains_key(&migration.id) {
                return Err(MigrateError::Load(format!(
                    "Duplicate migration id '{}'",
                    migration.id
                )));
            }
            order.push(migration.id.clone());
            by_id.insert(migration.id.clone(), migration);
        }

        Ok(Self { order, by_id })
    }

    pub fn get(&self, id: &str) -> Option<&Migration> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Migrations in declared order.
    pub fn iter(&self) -> impl Iterator<Item = &Migration> + '_ {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Ids in declared order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE_TEST: &str =
        "CREATE TABLE test (id serial PRIMARY KEY, name VARCHAR(50) UNIQUE NOT NULL)";

    #[test]
    fn test_checksum_is_lowercase_hex_md5() {
        assert_eq!(checksum(CREATE_TEST), "9c23564a026f0826f2a05b8423aa21f9");
        assert_eq!(checksum(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_checksum_sensitive_to_whitespace() {
        assert_ne!(checksum(CREATE_TEST), checksum(&format!("{CREATE_TEST}\n")));
    }

    #[test]
    fn test_migration_new_computes_checksum() {
        let m = Migration::new("Test", CREATE_TEST, "DROP TABLE test");
        assert_eq!(m.checksum, "9c23564a026f0826f2a05b8423aa21f9");
        assert_eq!(m.revert_script, "DROP TABLE test");
    }

    #[test]
    fn test_desired_set_preserves_declared_order() {
        let set = DesiredSet::new(vec![
            Migration::new("0003_c", "SELECT 3", ""),
            Migration::new("0001_a", "SELECT 1", ""),
            Migration::new("0002_b", "SELECT 2", ""),
        ])
        .unwrap();

        let ids: Vec<_> = set.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["0003_c", "0001_a", "0002_b"]);
        assert_eq!(set.len(), 3);
        assert!(set.contains("0001_a"));
        assert!(!set.contains("0004_d"));
    }

    #[test]
    fn test_desired_set_rejects_duplicates() {
        let err = DesiredSet::new(vec![
            Migration::new("a", "SELECT 1", ""),
            Migration::new("a", "SELECT 2", ""),
        ])
        .unwrap_err();
        assert!(matches!(err, MigrateError::Load(msg) if msg.contains("'a'")));
    }

    #[test]
    fn test_desired_set_rejects_empty_id() {
        let err = DesiredSet::new(vec![Migration::new("  ", "SELECT 1", "")]).unwrap_err();
        assert!(matches!(err, MigrateError::Load(_)));
    }

    #[test]
    fn test_empty_desired_set() {
        let set = DesiredSet::new(Vec::new()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }
}
