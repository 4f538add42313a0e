//! Vote repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Vote, vote};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, sea_query::Expr,
};
use stackit_common::AppResult;

/// Vote repository for database operations.
#[derive(Clone)]
pub struct VoteRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteRepository {
    /// Create a new vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the live vote of a user on a target.
    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        target_id: &str,
    ) -> AppResult<Option<vote::Model>> {
        Vote::find()
            .filter(vote::Column::UserId.eq(user_id))
            .filter(vote::Column::TargetId.eq(target_id))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Create a new vote.
    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        model: vote::ActiveModel,
    ) -> AppResult<vote::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Change the direction of an existing vote.
    pub async fn set_type<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        vote_type: vote::VoteType,
        now: chrono::DateTime<chrono::FixedOffset>,
    ) -> AppResult<()> {
        Vote::update_many()
            .col_expr(vote::Column::VoteType, Expr::value(vote_type))
            .col_expr(vote::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(vote::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Delete a vote.
    pub async fn delete<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        Vote::delete_by_id(id).exec(conn).await.map_err(db_err)?;
        Ok(())
    }

    /// Delete every vote on the given targets.
    pub async fn delete_by_targets<C: ConnectionTrait>(
        conn: &C,
        target_ids: &[String],
    ) -> AppResult<u64> {
        if target_ids.is_empty() {
            return Ok(0);
        }
        let result = Vote::delete_many()
            .filter(vote::Column::TargetId.is_in(target_ids.iter().cloned()))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    /// Count live (up, down) votes on a target.
    pub async fn tally<C: ConnectionTrait>(conn: &C, target_id: &str) -> AppResult<(u64, u64)> {
        let count = |vote_type: vote::VoteType| {
            Vote::find()
                .filter(vote::Column::TargetId.eq(target_id))
                .filter(vote::Column::VoteType.eq(vote_type))
                .count(conn)
        };
        let up = count(vote::VoteType::Up).await.map_err(db_err)?;
        let down = count(vote::VoteType::Down).await.map_err(db_err)?;
        Ok((up, down))
    }

    /// A user's live votes among `target_ids`.
    pub async fn find_by_user_and_targets(
        &self,
        user_id: &str,
        target_ids: &[String],
    ) -> AppResult<Vec<vote::Model>> {
        if target_ids.is_empty() {
            return Ok(vec![]);
        }
        Vote::find()
            .filter(vote::Column::UserId.eq(user_id))
            .filter(vote::Column::TargetId.is_in(target_ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_vote(id: &str, user_id: &str, target_id: &str, up: bool) -> vote::Model {
        vote::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            target_id: target_id.to_string(),
            target_type: vote::TargetType::Question,
            vote_type: if up {
                vote::VoteType::Up
            } else {
                vote::VoteType::Down
            },
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_existing_vote() {
        let v = create_test_vote("v1", "u1", "q1", true);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[v]])
            .into_connection();

        let found = VoteRepository::find(&db, "u1", "q1").await.unwrap().unwrap();

        assert_eq!(found.vote_type, vote::VoteType::Up);
    }

    #[tokio::test]
    async fn test_find_by_user_and_targets() {
        let votes = vec![
            create_test_vote("v1", "u1", "q1", true),
            create_test_vote("v2", "u1", "a1", false),
        ];

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([votes])
                .into_connection(),
        );

        let repo = VoteRepository::new(db);
        let result = repo
            .find_by_user_and_targets("u1", &["q1".to_string(), "a1".to_string()])
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[1].vote_type, vote::VoteType::Down);
    }

    #[test]
    fn test_opposite() {
        assert_eq!(vote::VoteType::Up.opposite(), vote::VoteType::Down);
        assert_eq!(vote::VoteType::Down.opposite(), vote::VoteType::Up);
    }
}
