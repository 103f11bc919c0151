//! Programmatic entry point: one configured run against one database.
//!
//! Wires the configuration, the file loader, the connection pool, the
//! advisory lock and the reconciliation engine together.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use migrago_core::config::MigragoConfig;
use migrago_core::error::Result;
use migrago_core::DesiredSet;
use migrago_runtime::{
    load_desired_migrations, Database, EngineOptions, MigrationLock, PgChangelogStore,
    ReconcilePlan, ReconciliationEngine, RunReport,
};

/// Prelude module for common imports.
pub mod prelude {
    pub use migrago_core::config::MigragoConfig;
    pub use migrago_core::error::{MigrateError, Result};
    pub use migrago_core::{checksum, ChangelogEntry, DesiredSet, Migration};
    pub use migrago_runtime::{
        ChangelogStore, EngineOptions, PgChangelogStore, ReconcilePlan, ReconciliationEngine,
        RunReport,
    };

    pub use crate::Migrago;
}

/// A configured migrago run.
pub struct Migrago {
    config: MigragoConfig,
    cancel: CancellationToken,
}

impl Migrago {
    pub fn new(config: MigragoConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use a caller-owned token; cancelling it aborts the in-flight step.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &MigragoConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Read the manifest and scripts named in `[source]`.
    pub fn load_desired(&self) -> Result<DesiredSet> {
        load_desired_migrations(&self.config.source.manifest, &self.config.source.scripts_dir)
    }

    /// Converge the database to the desired set.
    pub async fn run(&self) -> Result<RunReport> {
        let desired = self.load_desired()?;
        info!("Loaded {} desired migrations", desired.len());

        let db = self.connect().await?;
        let result = self.locked(&db, |engine| async move { engine.run(&desired).await }).await;
        db.close().await;
        result
    }

    /// Report what `run` would do.
    pub async fn status(&self) -> Result<ReconcilePlan> {
        let desired = self.load_desired()?;

        let db = self.connect().await?;
        let result = self
            .locked(&db, |engine| async move { engine.status(&desired).await })
            .await;
        db.close().await;
        result
    }

    async fn connect(&self) -> Result<Database> {
        let mut database = self.config.database.clone();
        // The lock pins one connection for the whole run.
        if self.config.run.lock && database.pool_size < 2 {
            database.pool_size = 2;
        }
        Database::from_config(&database).await
    }

    async fn locked<T, F, Fut>(&self, db: &Database, f: F) -> Result<T>
    where
        F: FnOnce(ReconciliationEngine<PgChangelogStore>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let store = PgChangelogStore::new(db.pool().clone(), self.config.changelog.table.clone())?;
        let engine = ReconciliationEngine::with_options(store, self.engine_options());

        if !self.config.run.lock {
            return f(engine).await;
        }

        let lock =
            MigrationLock::acquire_until_cancelled(db.pool(), self.config.run.lock_id, &self.cancel)
                .await?;
        let result = f(engine).await;

        // Always release lock, even on error
        if let Err(e) = lock.release().await {
            warn!("Failed to release migration lock: {}", e);
        }

        result
    }

    fn engine_options(&self) -> EngineOptions {
        let step_timeout = match self.config.run.step_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        EngineOptions {
            step_timeout,
            cancel: self.cancel.clone(),
        }
    }
}
