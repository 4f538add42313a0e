//! Karma history repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{KarmaHistory, karma_history};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use stackit_common::AppResult;

/// Karma history repository for database operations.
#[derive(Clone)]
pub struct KarmaRepository {
    db: Arc<DatabaseConnection>,
}

impl KarmaRepository {
    /// Create a new karma history repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the entry recorded for a logical event.
    pub async fn find_by_event_key<C: ConnectionTrait>(
        conn: &C,
        event_key: &str,
    ) -> AppResult<Option<karma_history::Model>> {
        KarmaHistory::find()
            .filter(karma_history::Column::EventKey.eq(event_key))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Append an entry.
    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        model: karma_history::ActiveModel,
    ) -> AppResult<karma_history::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Sum of every award to a user.
    pub async fn total_for_user<C: ConnectionTrait>(conn: &C, user_id: &str) -> AppResult<i64> {
        let total = KarmaHistory::find()
            .select_only()
            .column_as(karma_history::Column::Points.sum(), "total")
            .filter(karma_history::Column::UserId.eq(user_id))
            .into_tuple::<Option<i64>>()
            .one(conn)
            .await
            .map_err(db_err)?;
        Ok(total.flatten().unwrap_or(0))
    }

    /// Newest entries of a user.
    pub async fn find_by_user(
        &self,
        user_id: &str,
        limit: u64,
    ) -> AppResult<Vec<karma_history::Model>> {
        KarmaHistory::find()
            .filter(karma_history::Column::UserId.eq(user_id))
            .order_by_desc(karma_history::Column::CreatedAt)
            .order_by_desc(karma_history::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }
}
