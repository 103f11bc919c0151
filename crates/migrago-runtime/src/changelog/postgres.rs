use std::future::Future;
use std::pin::Pin;

use chrono::NaiveDateTime;
use sqlx::PgPool;
use tracing::debug;

use migrago_core::config::validate_table_name;
use migrago_core::error::{MigrateError, Result};
use migrago_core::{ChangelogEntry, Migration};

use super::ChangelogStore;

/// Changelog stored in a PostgreSQL table.
#[derive(Clone)]
pub struct PgChangelogStore {
    pool: PgPool,
    table: String,
}

impl PgChangelogStore {
    /// Create a store backed by `table` (plain or schema-qualified identifier).
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self { pool, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init(&self) -> Result<()> {
        // Unquoted identifiers: PostgreSQL folds installedAt to installedat.
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id VARCHAR(255) PRIMARY KEY,
                checksum VARCHAR(255) NOT NULL,
                installedAt TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                revertscript TEXT
            )
            "#,
            self.table
        );

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                MigrateError::Storage(format!(
                    "Failed to create changelog table {}: {}",
                    self.table, e
                ))
            })?;
        Ok(())
    }

    async fn applied(&self) -> Result<Vec<ChangelogEntry>> {
        let sql = format!(
            "SELECT id, checksum, installedAt, revertscript FROM {} ORDER BY installedAt DESC, id DESC",
            self.table
        );

        let rows: Vec<(String, String, NaiveDateTime, Option<String>)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::Storage(format!("Failed to read changelog: {}", e)))?;

        debug!("Read {} changelog entries from {}", rows.len(), self.table);

        Ok(rows
            .into_iter()
            .map(|(id, checksum, installed_at, revert_script)| ChangelogEntry {
                id,
                checksum,
                installed_at,
                revert_script,
            })
            .collect())
    }

    fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, checksum, revertscript) VALUES ($1, $2, $3)",
            self.table
        )
    }

    fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE id = $1", self.table)
    }
}

fn begin_error(id: &str, e: sqlx::Error) -> MigrateError {
    MigrateError::Storage(format!("Failed to begin transaction for '{}': {}", id, e))
}

fn execution_error(id: &str, e: sqlx::Error) -> MigrateError {
    MigrateError::Execution {
        id: id.to_string(),
        message: e.to_string(),
    }
}

/// Empty or comment-only script.
///
/// Non-blank scripts go through the simple-query protocol, which accepts
/// several statements and dollar-quoted bodies, so they are sent as-is.
fn is_blank(script: &str) -> bool {
    script.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with("--")
    })
}

impl ChangelogStore for PgChangelogStore {
    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.init().await })
    }

    fn list_applied(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ChangelogEntry>>> + Send + '_>> {
        Box::pin(async move { self.applied().await })
    }

    fn apply_migration<'a>(
        &'a self,
        migration: &'a Migration,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let id = migration.id.clone();
        let script = migration.script.clone();
        let checksum = migration.checksum.clone();
        let revert_script = migration.revert_script.clone();
        let insert = self.insert_sql();
        let pool = self.pool.clone();

        Box::pin(async move {
            let mut tx = pool.begin().await.map_err(|e| begin_error(&id, e))?;

            if is_blank(&script) {
                debug!("Script for '{}' is empty, nothing to execute", id);
            } else {
                sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&script))
                    .await
                    .map_err(|e| execution_error(&id, e))?;
            }

            sqlx::query(&insert)
                .bind(id.clone())
                .bind(checksum)
                .bind(revert_script)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    MigrateError::Storage(format!("Failed to record migration '{}': {}", id, e))
                })?;

            tx.commit().await.map_err(|e| {
                MigrateError::Storage(format!("Failed to commit migration '{}': {}", id, e))
            })
        })
    }

    fn revert_migration<'a>(
        &'a self,
        entry: &'a ChangelogEntry,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let id = entry.id.clone();
        let script = entry.revert_script.clone();
        let delete = self.delete_sql();
        let pool = self.pool.clone();

        Box::pin(async move {
            let script = script.ok_or_else(|| MigrateError::MissingRevertScript { id: id.clone() })?;

            let mut tx = pool.begin().await.map_err(|e| begin_error(&id, e))?;

            if is_blank(&script) {
                debug!("Revert script for '{}' is empty, nothing to execute", id);
            } else {
                sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&script))
                    .await
                    .map_err(|e| execution_error(&id, e))?;
            }

            let deleted = sqlx::query(&delete)
                .bind(id.clone())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    MigrateError::Storage(format!(
                        "Failed to delete changelog entry '{}': {}",
                        id, e
                    ))
                })?
                .rows_affected();

            // The row vanished since the snapshot was read; leave everything as it was.
            if deleted == 0 {
                return Err(MigrateError::Storage(format!(
                    "Changelog entry '{}' no longer exists",
                    id
                )));
            }

            tx.commit().await.map_err(|e| {
                MigrateError::Storage(format!("Failed to commit revert of '{}': {}", id, e))
            })
        })
    }
}
