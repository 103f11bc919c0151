pub mod changelog;
pub mod db;
pub mod loader;
pub mod lock;
pub mod reconcile;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use changelog::{ChangelogStore, PgChangelogStore};
pub use db::Database;
pub use loader::load_desired_migrations;
pub use lock::{MigrationLock, LOCK_STEP};
pub use reconcile::{EngineOptions, CHANGELOG_STEP, ReconcilePlan, ReconciliationEngine, RunReport, RunState};
