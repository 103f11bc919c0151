use chrono::NaiveDateTime;

use crate::migration::Migration;

/// A migration recorded as applied in the changelog table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub id: String,
    /// Checksum of the forward script as it was applied.
    pub checksum: String,
    /// Insertion time; defines apply order.
    pub installed_at: NaiveDateTime,
    /// Captured at apply time so the entry can be undone on its own.
    pub revert_script: Option<String>,
}

impl ChangelogEntry {
    /// The entry a successful apply of `migration` records.
    pub fn from_migration(migration: &Migration, installed_at: NaiveDateTime) -> Self {
        Self {
            id: migration.id.clone(),
            checksum: migration.checksum.clone(),
            installed_at,
            revert_script: Some(migration.revert_script.clone()),
        }
    }
}
