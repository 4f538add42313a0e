//! Test utilities for database operations.
//!
//! Ledger tests run against an in-memory SQLite database with the real
//! migrations applied, so unique keys and transactions behave as in
//! production.

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::migrations::Migrator;

/// In-memory SQLite URL.
pub const SQLITE_MEMORY_URL: &str = "sqlite::memory:";

/// Open a fresh in-memory database and run all migrations.
///
/// The pool holds exactly one connection: each `sqlite::memory:` connection
/// is its own database.
pub async fn setup_sqlite() -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(SQLITE_MEMORY_URL);
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let conn = Database::connect(opt).await?;
    Migrator::up(&conn, None).await?;

    info!("Created in-memory test database");
    Ok(conn)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::User;
    use sea_orm::{EntityTrait, PaginatorTrait};

    #[tokio::test]
    async fn test_setup_sqlite_runs_migrations() {
        let db = setup_sqlite().await.unwrap();
        assert_eq!(User::find().count(&db).await.unwrap(), 0);
    }
}
