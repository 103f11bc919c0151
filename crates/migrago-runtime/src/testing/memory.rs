//! In-memory changelog store for testing the engine without a database.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use migrago_core::error::{MigrateError, Result};
use migrago_core::{ChangelogEntry, Migration};

use crate::changelog::ChangelogStore;

/// A script that ran against the (simulated) schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEvent {
    Applied(String),
    Reverted(String),
}

/// Fault injected for a migration id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The forward or revert script fails.
    Execution,
    /// The bookkeeping write fails.
    Storage,
}

#[derive(Default)]
struct State {
    schema_ensured: bool,
    next_seq: i64,
    /// Oldest first.
    rows: Vec<ChangelogEntry>,
    journal: Vec<ScriptEvent>,
    faults: HashMap<String, Fault>,
    delays: HashMap<String, Duration>,
    stall_listing: bool,
}

/// Changelog kept in memory.
///
/// Clones share state, so a test can hand one clone to the engine and inspect
/// another. Apply and revert change nothing until they succeed, matching the
/// transactional contract of the real store.
#[derive(Clone, Default)]
pub struct MemoryChangelogStore {
    state: Arc<RwLock<State>>,
}

impl MemoryChangelogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `migration` as applied without running anything. Later seeds are newer.
    pub fn seed(&self, migration: &Migration) {
        let mut state = self.state.write().unwrap();
        let installed_at = next_timestamp(&mut state);
        state
            .rows
            .push(ChangelogEntry::from_migration(migration, installed_at));
    }

    /// Record a raw entry (e.g. one without a revert script). Later seeds are newer.
    pub fn seed_entry(&self, mut entry: ChangelogEntry) {
        let mut state = self.state.write().unwrap();
        entry.installed_at = next_timestamp(&mut state);
        state.rows.push(entry);
    }

    /// Make every apply/revert of `id` fail.
    pub fn fail_on(&self, id: &str, fault: Fault) {
        self.state
            .write()
            .unwrap()
            .faults
            .insert(id.to_string(), fault);
    }

    pub fn clear_faults(&self) {
        self.state.write().unwrap().faults.clear();
    }

    /// Make every apply/revert of `id` take at least `delay` before committing.
    pub fn delay_on(&self, id: &str, delay: Duration) {
        self.state
            .write()
            .unwrap()
            .delays
            .insert(id.to_string(), delay);
    }

    /// Make `list_applied` never resolve, like a read blocked on a table lock.
    pub fn stall_listing(&self) {
        self.state.write().unwrap().stall_listing = true;
    }

    /// Entries, newest first.
    pub fn entries(&self) -> Vec<ChangelogEntry> {
        self.state.read().unwrap().rows.iter().rev().cloned().collect()
    }

    /// Scripts executed through the store, in order.
    pub fn journal(&self) -> Vec<ScriptEvent> {
        self.state.read().unwrap().journal.clone()
    }

    pub fn schema_ensured(&self) -> bool {
        self.state.read().unwrap().schema_ensured
    }

    async fn pause(&self, id: &str) {
        let delay = self.state.read().unwrap().delays.get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_fault(&self, id: &str) -> Result<()> {
        match self.state.read().unwrap().faults.get(id) {
            Some(Fault::Execution) => Err(MigrateError::Execution {
                id: id.to_string(),
                message: "injected script failure".into(),
            }),
            Some(Fault::Storage) => Err(MigrateError::Storage(format!(
                "injected storage failure for '{}'",
                id
            ))),
            None => Ok(()),
        }
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        self.pause(&migration.id).await;
        self.check_fault(&migration.id)?;

        let mut state = self.state.write().unwrap();
        if state.rows.iter().any(|r| r.id == migration.id) {
            return Err(MigrateError::Storage(format!(
                "duplicate key value violates unique constraint: id={}",
                migration.id
            )));
        }
        let installed_at = next_timestamp(&mut state);
        state
            .rows
            .push(ChangelogEntry::from_migration(migration, installed_at));
        state
            .journal
            .push(ScriptEvent::Applied(migration.id.clone()));
        Ok(())
    }

    async fn revert(&self, entry: &ChangelogEntry) -> Result<()> {
        if entry.revert_script.is_none() {
            return Err(MigrateError::MissingRevertScript {
                id: entry.id.clone(),
            });
        }
        self.pause(&entry.id).await;
        self.check_fault(&entry.id)?;

        let mut state = self.state.write().unwrap();
        let before = state.rows.len();
        state.rows.retain(|r| r.id != entry.id);
        if state.rows.len() == before {
            return Err(MigrateError::Storage(format!(
                "Changelog entry '{}' no longer exists",
                entry.id
            )));
        }
        state.journal.push(ScriptEvent::Reverted(entry.id.clone()));
        Ok(())
    }
}

fn next_timestamp(state: &mut State) -> NaiveDateTime {
    state.next_seq += 1;
    let epoch = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    epoch + TimeDelta::seconds(state.next_seq)
}

impl ChangelogStore for MemoryChangelogStore {
    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.state.write().unwrap().schema_ensured = true;
            Ok(())
        })
    }

    fn list_applied(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ChangelogEntry>>> + Send + '_>> {
        Box::pin(async move {
            let stalled = self.state.read().unwrap().stall_listing;
            if stalled {
                std::future::pending::<()>().await;
            }
            Ok(self.entries())
        })
    }

    fn apply_migration<'a>(
        &'a self,
        migration: &'a Migration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.apply(migration))
    }

    fn revert_migration<'a>(
        &'a self,
        entry: &'a ChangelogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.revert(entry))
    }
}
