//! Advisory lock that serializes runs against one database.
//!
//! The engine never takes it; callers that may run concurrently (several
//! deploy jobs, replicas starting together) wrap the run with it.

use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use migrago_core::error::{MigrateError, Result};

/// Step name reported when waiting for the lock is cancelled.
pub const LOCK_STEP: &str = "<lock>";

/// A held session-level `pg_advisory_lock`.
///
/// The lock belongs to one connection, so that connection is kept out of the
/// pool until [`MigrationLock::release`]. If the process dies the server drops
/// the session and the lock with it.
pub struct MigrationLock {
    conn: PoolConnection<Postgres>,
    lock_id: i64,
}

impl MigrationLock {
    /// Block until the lock is acquired.
    pub async fn acquire(pool: &PgPool, lock_id: i64) -> Result<Self> {
        debug!("Acquiring migration lock {}...", lock_id);
        let mut conn = pool.acquire().await.map_err(|e| {
            MigrateError::Storage(format!("Failed to acquire lock connection: {}", e))
        })?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(lock_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                MigrateError::Storage(format!("Failed to acquire migration lock: {}", e))
            })?;
        debug!("Migration lock acquired");

        Ok(Self { conn, lock_id })
    }

    /// Like [`MigrationLock::acquire`], but gives up when `cancel` fires.
    ///
    /// A wait abandoned this way drops its connection; the caller is expected
    /// to close the pool, which ends the session and any lock it was granted.
    pub async fn acquire_until_cancelled(
        pool: &PgPool,
        lock_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MigrateError::Cancelled {
                id: LOCK_STEP.to_string(),
            }),
            lock = Self::acquire(pool, lock_id) => lock,
        }
    }

    pub fn lock_id(&self) -> i64 {
        self.lock_id
    }

    pub async fn release(mut self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(self.lock_id)
            .execute(&mut *self.conn)
            .await
            .map_err(|e| {
                MigrateError::Storage(format!("Failed to release migration lock: {}", e))
            })?;
        debug!("Migration lock released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_wait_returns_without_connecting() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy("postgres://localhost/nonexistent")
            .expect("lazy pool");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = MigrationLock::acquire_until_cancelled(&pool, 7, &cancel).await;

        assert!(matches!(result, Err(MigrateError::Cancelled { ref id }) if id == LOCK_STEP));
    }
}
