//! Durable bookkeeping of applied migrations.

mod postgres;

pub use postgres::PgChangelogStore;

use std::future::Future;
use std::pin::Pin;

use migrago_core::error::Result;
use migrago_core::{ChangelogEntry, Migration};

/// Storage for the changelog of applied migrations.
///
/// `apply_migration` and `revert_migration` are atomic: the script and the
/// changelog row change together or not at all. Dropping one of their futures
/// before it resolves must leave nothing committed.
pub trait ChangelogStore: Send + Sync {
    /// Create the changelog relation if it does not exist.
    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// All entries, newest first.
    fn list_applied(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ChangelogEntry>>> + Send + '_>>;

    /// Run `migration.script` and record it, in one transaction.
    fn apply_migration<'a>(
        &'a self,
        migration: &'a Migration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Run the entry's revert script and delete its row, in one transaction.
    fn revert_migration<'a>(
        &'a self,
        entry: &'a ChangelogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
