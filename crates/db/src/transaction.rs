//! Atomic unit-of-work runner.
//!
//! Every ledger mutation that touches more than one row is expressed as a
//! [`UnitOfWork`] and executed by [`run_atomic`]: one database transaction
//! per attempt, committed on success, rolled back on error, and re-run from
//! scratch when the store reports a write conflict.

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DatabaseTransaction, IsolationLevel,
    TransactionTrait,
};
use stackit_common::{AppError, AppResult, LedgerConfig, get_metrics};

use crate::db_err;

/// A transactional body.
///
/// `run` may execute several times; it must derive everything it writes from
/// what it reads through `txn`.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Value produced on commit.
    type Output: Send;

    /// Execute the body inside `txn`.
    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<Self::Output>;
}

/// Bounded retry for conflicting transactions.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Sleep before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LedgerConfig::default())
    }
}

impl From<&LedgerConfig> for RetryPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

/// Run `work` atomically, retrying on [`AppError::Conflict`].
///
/// PostgreSQL transactions run at `SERIALIZABLE`; SQLite serializes writers
/// on its own.
pub async fn run_atomic<W>(
    db: &DatabaseConnection,
    policy: &RetryPolicy,
    work: &W,
) -> AppResult<W::Output>
where
    W: UnitOfWork + ?Sized,
{
    let isolation = match db.get_database_backend() {
        DatabaseBackend::Postgres => Some(IsolationLevel::Serializable),
        _ => None,
    };
    let metrics = get_metrics();
    let mut attempt: u32 = 1;

    loop {
        match run_once(db, isolation, work).await {
            Ok(output) => {
                metrics.record_txn_attempt(true);
                return Ok(output);
            }
            Err(AppError::Conflict(reason)) if attempt < policy.max_attempts => {
                metrics.record_txn_attempt(false);
                tracing::debug!(attempt, reason = %reason, "Write conflict, retrying transaction");
                tokio::time::sleep(policy.backoff * attempt).await;
                attempt += 1;
            }
            Err(AppError::Conflict(reason)) => {
                metrics.record_txn_exhausted();
                tracing::warn!(attempts = attempt, reason = %reason, "Transaction retries exhausted");
                return Err(AppError::Conflict(
                    "Too many concurrent updates, please try again".to_string(),
                ));
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run_once<W>(
    db: &DatabaseConnection,
    isolation: Option<IsolationLevel>,
    work: &W,
) -> AppResult<W::Output>
where
    W: UnitOfWork + ?Sized,
{
    let txn = db.begin_with_config(isolation, None).await.map_err(db_err)?;

    match work.run(&txn).await {
        Ok(output) => {
            txn.commit().await.map_err(db_err)?;
            Ok(output)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback().await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}
