//! Explicit database provisioning for tests.
//!
//! The database URL comes from `TEST_DATABASE_URL` or is passed directly.
//! `DATABASE_URL` is never read, so tests cannot reach a production database
//! by accident.

use sqlx::PgPool;

use migrago_core::error::{MigrateError, Result};

/// Explicit database access for tests.
pub struct TestDatabase {
    pool: PgPool,
    url: String,
}

impl TestDatabase {
    /// Connect to database at the given URL.
    pub async fn from_url(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Connect using `TEST_DATABASE_URL`, or `None` when it is not set.
    pub async fn from_env() -> Result<Option<Self>> {
        match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => Self::from_url(&url).await.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Creates a dedicated database for a single test.
    pub async fn isolated(&self, test_name: &str) -> Result<IsolatedTestDb> {
        // UUID suffix prevents collisions when tests run in parallel
        let db_name = format!(
            "migrago_test_{}_{}",
            sanitize_db_name(test_name),
            uuid::Uuid::new_v4().simple()
        );

        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::Storage(format!("Failed to create test database: {}", e)))?;

        let test_url = replace_db_name(&self.url, &db_name);
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(3)
            .connect(&test_url)
            .await?;

        Ok(IsolatedTestDb {
            pool,
            db_name,
            admin: self.pool.clone(),
        })
    }
}

/// A database that exists for the lifetime of a single test.
pub struct IsolatedTestDb {
    pool: PgPool,
    db_name: String,
    admin: PgPool,
}

impl IsolatedTestDb {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Run raw SQL to set up test data or schema.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Whether a table with this name exists in the public schema.
    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Drop the database.
    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;

        let _ = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1",
        )
        .bind(&self.db_name)
        .execute(&self.admin)
        .await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
            .execute(&self.admin)
            .await?;

        Ok(())
    }
}

/// Sanitize a test name for use in a database name.
fn sanitize_db_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(24)
        .collect()
}

/// Replace the database name in a connection URL.
fn replace_db_name(url: &str, new_db: &str) -> String {
    if let Some(idx) = url.rfind('/') {
        let base = &url[..=idx];
        if let Some(query_idx) = url[idx + 1..].find('?') {
            let query = &url[idx + 1 + query_idx..];
            format!("{}{}{}", base, new_db, query)
        } else {
            format!("{}{}", base, new_db)
        }
    } else {
        format!("{}/{}", url, new_db)
    }
}
