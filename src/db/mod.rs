//! Postgres connection pool, migrations, and health check.
//!
//! `Db` is created once at startup and passed explicitly to whatever needs
//! it. Submodules add operations via `impl Db` blocks.

pub mod assignment;
pub mod store;
pub mod work;
pub mod worker;

pub use store::PgAssignmentTx;

use crate::error::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Clones share the connection pool.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| crate::error::Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Round-trip a `SELECT 1`.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Postgres has no unsigned integers; counts are stored as INTEGER with a
/// non-negative CHECK.
pub(crate) fn to_count(value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| crate::error::Error::Other(format!("negative open item count in store: {value}")))
}
