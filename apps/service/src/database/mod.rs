//! Storage of check results and alerts in a local libsql database.

pub mod migrations;
pub mod repository;

pub use repository::{DatabaseImpl, NoopPersistence, Persistence};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
