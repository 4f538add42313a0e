//! Database layer for stackit.
//!
//! Entities, migrations and repositories, plus the [`transaction`] runner
//! every multi-row ledger write goes through.

pub mod entities;
pub mod migrations;
pub mod repositories;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transaction;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, SqlErr};
use stackit_common::{AppError, Config};
use std::time::Duration;
use tracing::log::LevelFilter;

pub use transaction::{RetryPolicy, UnitOfWork, run_atomic};

/// Error text fragments that mark a retryable write conflict.
const CONFLICT_MARKERS: &[&str] = &[
    "40001",
    "could not serialize access",
    "deadlock detected",
    "database is locked",
    "database table is locked",
];

/// Initialize database connection.
pub async fn init(config: &Config) -> Result<DatabaseConnection, AppError> {
    let mut opt = ConnectOptions::new(&config.database.url);

    opt.max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt).await.map_err(db_err)
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None).await.map_err(db_err)
}

/// Classify a database error.
///
/// Unique-key races and serialization failures become [`AppError::Conflict`]
/// so that [`run_atomic`] retries them; everything else is a plain
/// [`AppError::Database`].
#[must_use]
pub fn db_err(err: DbErr) -> AppError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return AppError::Conflict(err.to_string());
    }
    let message = err.to_string();
    if CONFLICT_MARKERS.iter().any(|m| message.contains(m)) {
        AppError::Conflict(message)
    } else {
        AppError::Database(message)
    }
}
