//! Pure reconciliation: decide what to revert, keep and apply.

use std::collections::HashSet;

use migrago_core::error::{MigrateError, Result};
use migrago_core::{ChangelogEntry, DesiredSet, Migration};

/// What a run will do, computed from a consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Entries to revert, newest first.
    pub reverts: Vec<ChangelogEntry>,
    /// Applied entries that are still desired and checksum-verified, newest first.
    pub kept: Vec<String>,
    /// Desired migrations never applied, in declared order.
    pub pending: Vec<Migration>,
}

impl ReconcilePlan {
    /// True when the database already matches the desired set.
    pub fn is_noop(&self) -> bool {
        self.reverts.is_empty() && self.pending.is_empty()
    }
}

/// Reconcile the desired set against the changelog (newest first).
///
/// The applied entries form a stack. Undesired entries are reverted from the top
/// down; once a desired entry has been seen, an undesired entry below it cannot
/// be removed and the plan fails. Desired entries must match their recorded
/// checksum. Every failure is raised before anything is mutated.
pub fn plan(desired: &DesiredSet, applied: &[ChangelogEntry]) -> Result<ReconcilePlan> {
    let mut still_wanted_seen = false;
    let mut reverts = Vec::new();
    let mut kept = Vec::new();
    let mut consumed = HashSet::new();

    for entry in applied {
        match desired.get(&entry.id) {
            Some(migration) => {
                if migration.checksum != entry.checksum {
                    return Err(MigrateError::ChecksumMismatch {
                        id: entry.id.clone(),
                        file_checksum: migration.checksum.clone(),
                        db_checksum: entry.checksum.clone(),
                    });
                }
                still_wanted_seen = true;
                kept.push(entry.id.clone());
                consumed.insert(entry.id.as_str());
            }
            None if still_wanted_seen => {
                return Err(MigrateError::NonRevertibleOrder {
                    id: entry.id.clone(),
                });
            }
            None => {
                if entry.revert_script.is_none() {
                    return Err(MigrateError::MissingRevertScript {
                        id: entry.id.clone(),
                    });
                }
                reverts.push(entry.clone());
            }
        }
    }

    let pending = desired
        .iter()
        .filter(|m| !consumed.contains(m.id.as_str()))
        .cloned()
        .collect();

    Ok(ReconcilePlan {
        reverts,
        kept,
        pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, minute, 0)
            .unwrap()
    }

    fn entry(id: &str, checksum: &str, minute: u32) -> ChangelogEntry {
        ChangelogEntry {
            id: id.to_string(),
            checksum: checksum.to_string(),
            installed_at: at(minute),
            revert_script: Some(format!("DROP TABLE {}", id.to_lowercase())),
        }
    }

    fn desired(items: &[(&str, &str)]) -> DesiredSet {
        DesiredSet::new(
            items
                .iter()
                .map(|(id, checksum)| {
                    Migration::with_checksum(*id, format!("CREATE TABLE {id} ()"), "", *checksum)
                })
                .collect(),
        )
        .unwrap()
    }

    fn pending_ids(plan: &ReconcilePlan) -> Vec<&str> {
        plan.pending.iter().map(|m| m.id.as_str()).collect()
    }

    fn revert_ids(plan: &ReconcilePlan) -> Vec<&str> {
        plan.reverts.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_empty_everything_is_noop() {
        let plan = plan(&desired(&[]), &[]).unwrap();
        assert!(plan.is_noop());
        assert!(plan.kept.is_empty());
    }

    #[test]
    fn test_fresh_database_applies_everything() {
        let plan = plan(&desired(&[("T", "c1")]), &[]).unwrap();
        assert_eq!(pending_ids(&plan), vec!["T"]);
        assert!(plan.reverts.is_empty());
    }

    #[test]
    fn test_reverts_trailing_undesired_entry() {
        let applied = vec![entry("T2", "c2", 2), entry("T", "c1", 1)];
        let plan = plan(&desired(&[("T", "c1")]), &applied).unwrap();

        assert_eq!(revert_ids(&plan), vec!["T2"]);
        assert_eq!(plan.kept, vec!["T"]);
        assert!(plan.pending.is_empty());
    }

    #[test]
    fn test_reverts_several_newest_first() {
        let applied = vec![
            entry("Test3", "c3", 3),
            entry("Test2", "c2", 2),
            entry("Test", "c1", 1),
        ];
        let plan = plan(&desired(&[("Test", "c1")]), &applied).unwrap();
        assert_eq!(revert_ids(&plan), vec!["Test3", "Test2"]);
        assert_eq!(plan.kept, vec!["Test"]);
    }

    #[test]
    fn test_reverts_whole_stack_when_nothing_desired() {
        let applied = vec![entry("B", "c2", 2), entry("A", "c1", 1)];
        let plan = plan(&desired(&[]), &applied).unwrap();
        assert_eq!(revert_ids(&plan), vec!["B", "A"]);
        assert!(plan.kept.is_empty());
    }

    #[test]
    fn test_checksum_drift_detected() {
        let applied = vec![entry("T2", "old", 1)];
        let err = plan(&desired(&[("T2", "new")]), &applied).unwrap_err();
        match err {
            MigrateError::ChecksumMismatch {
                id,
                file_checksum,
                db_checksum,
            } => {
                assert_eq!(id, "T2");
                assert_eq!(file_checksum, "new");
                assert_eq!(db_checksum, "old");
            }
            other => panic!("expected ChecksumMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_checksum_drift_below_revertible_entry_still_fails() {
        // Nothing may be reverted when a kept entry has drifted.
        let applied = vec![entry("New", "c2", 2), entry("Old", "c1", 1)];
        let err = plan(&desired(&[("Old", "changed")]), &applied).unwrap_err();
        assert!(matches!(err, MigrateError::ChecksumMismatch { id, .. } if id == "Old"));
    }

    #[test]
    fn test_undesired_below_desired_is_not_revertible() {
        // T was applied first, T2 on top of it; dropping only T would remove
        // from the middle of the stack.
        let applied = vec![entry("T2", "c2", 2), entry("T", "c1", 1)];
        let err = plan(&desired(&[("T2", "c2")]), &applied).unwrap_err();
        assert!(matches!(err, MigrateError::NonRevertibleOrder { id } if id == "T"));
    }

    #[test]
    fn test_missing_revert_script_detected_before_mutation() {
        let mut top = entry("T2", "c2", 2);
        top.revert_script = None;
        let applied = vec![top, entry("T", "c1", 1)];
        let err = plan(&desired(&[("T", "c1")]), &applied).unwrap_err();
        assert!(matches!(err, MigrateError::MissingRevertScript { id } if id == "T2"));
    }

    #[test]
    fn test_empty_revert_script_is_allowed() {
        let mut top = entry("T2", "c2", 2);
        top.revert_script = Some(String::new());
        let plan = plan(&desired(&[]), &[top]).unwrap();
        assert_eq!(revert_ids(&plan), vec!["T2"]);
    }

    #[test]
    fn test_pending_keeps_declared_order() {
        let applied = vec![entry("0002", "c2", 1)];
        let plan = plan(
            &desired(&[("0001", "c1"), ("0002", "c2"), ("0004", "c4"), ("0003", "c3")]),
            &applied,
        )
        .unwrap();
        assert_eq!(pending_ids(&plan), vec!["0001", "0004", "0003"]);
        assert_eq!(plan.kept, vec!["0002"]);
    }

    #[test]
    fn test_converged_state_is_noop() {
        let applied = vec![entry("B", "c2", 2), entry("A", "c1", 1)];
        let plan = plan(&desired(&[("A", "c1"), ("B", "c2")]), &applied).unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.kept, vec!["B", "A"]);
    }

    #[test]
    fn test_revert_then_apply_in_same_plan() {
        let applied = vec![entry("Experimental", "cx", 2), entry("A", "c1", 1)];
        let plan = plan(&desired(&[("A", "c1"), ("B", "c2")]), &applied).unwrap();
        assert_eq!(revert_ids(&plan), vec!["Experimental"]);
        assert_eq!(pending_ids(&plan), vec!["B"]);
    }
}
