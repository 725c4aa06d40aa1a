//! Durable store for the Remotebuild job engine.
//!
//! Provides the `JobStore` trait plus its PostgreSQL implementation.
//! Writes commit synchronously; a returned `Ok` means the row is durable.

pub mod error;
pub mod pg;
pub mod records;
pub mod store;

pub use error::{DbError, DbResult};
pub use pg::PgJobStore;
pub use records::*;
pub use store::JobStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
