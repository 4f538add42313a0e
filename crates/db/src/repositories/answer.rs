//! Answer repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Answer, answer};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};
use stackit_common::{AppError, AppResult};

/// Answer repository for database operations.
#[derive(Clone)]
pub struct AnswerRepository {
    db: Arc<DatabaseConnection>,
}

impl AnswerRepository {
    /// Create a new answer repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an answer by ID.
    pub async fn find_by_id<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<answer::Model>> {
        Answer::find_by_id(id).one(conn).await.map_err(db_err)
    }

    /// Get an answer by ID, returning an error if not found.
    pub async fn get_by_id<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<answer::Model> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| AppError::AnswerNotFound(id.to_string()))
    }

    /// Create a new answer.
    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        model: answer::ActiveModel,
    ) -> AppResult<answer::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Update an answer.
    pub async fn update<C: ConnectionTrait>(
        conn: &C,
        model: answer::ActiveModel,
    ) -> AppResult<answer::Model> {
        model.update(conn).await.map_err(db_err)
    }

    /// Delete an answer row.
    pub async fn delete<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        Answer::delete_by_id(id).exec(conn).await.map_err(db_err)?;
        Ok(())
    }

    /// Delete every answer of a question.
    pub async fn delete_by_question<C: ConnectionTrait>(
        conn: &C,
        question_id: &str,
    ) -> AppResult<u64> {
        let result = Answer::delete_many()
            .filter(answer::Column::QuestionId.eq(question_id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }

    /// Apply vote counter deltas in a single UPDATE.
    pub async fn adjust_votes<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        up_delta: i32,
        down_delta: i32,
    ) -> AppResult<()> {
        Answer::update_many()
            .col_expr(
                answer::Column::Upvotes,
                Expr::col(answer::Column::Upvotes).add(up_delta),
            )
            .col_expr(
                answer::Column::Downvotes,
                Expr::col(answer::Column::Downvotes).add(down_delta),
            )
            .filter(answer::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Overwrite vote counters (reconciliation).
    pub async fn set_votes<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        upvotes: i32,
        downvotes: i32,
    ) -> AppResult<()> {
        Answer::update_many()
            .col_expr(answer::Column::Upvotes, Expr::value(upvotes))
            .col_expr(answer::Column::Downvotes, Expr::value(downvotes))
            .filter(answer::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Set or clear the accepted flag on one answer.
    pub async fn set_accepted<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        accepted: bool,
    ) -> AppResult<()> {
        Answer::update_many()
            .col_expr(answer::Column::IsAccepted, Expr::value(accepted))
            .filter(answer::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Every answer of a question currently flagged accepted.
    pub async fn find_accepted<C: ConnectionTrait>(
        conn: &C,
        question_id: &str,
    ) -> AppResult<Vec<answer::Model>> {
        Answer::find()
            .filter(answer::Column::QuestionId.eq(question_id))
            .filter(answer::Column::IsAccepted.eq(true))
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Answers of a question: accepted first, then by net score, then newest.
    pub async fn find_by_question<C: ConnectionTrait>(
        conn: &C,
        question_id: &str,
    ) -> AppResult<Vec<answer::Model>> {
        Answer::find()
            .filter(answer::Column::QuestionId.eq(question_id))
            .order_by_desc(answer::Column::IsAccepted)
            .order_by(
                Expr::col(answer::Column::Upvotes).sub(Expr::col(answer::Column::Downvotes)),
                Order::Desc,
            )
            .order_by_desc(answer::Column::CreatedAt)
            .order_by_desc(answer::Column::Id)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Count answers of a question.
    pub async fn count_by_question<C: ConnectionTrait>(
        conn: &C,
        question_id: &str,
    ) -> AppResult<u64> {
        Answer::find()
            .filter(answer::Column::QuestionId.eq(question_id))
            .count(conn)
            .await
            .map_err(db_err)
    }

    /// IDs of answers written by `author_id`, oldest first.
    pub async fn ids_by_author<C: ConnectionTrait>(
        conn: &C,
        author_id: &str,
    ) -> AppResult<Vec<String>> {
        Answer::find()
            .select_only()
            .column(answer::Column::Id)
            .filter(answer::Column::AuthorId.eq(author_id))
            .order_by_asc(answer::Column::CreatedAt)
            .order_by_asc(answer::Column::Id)
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// IDs of currently accepted answers written by `author_id`.
    pub async fn accepted_ids_by_author<C: ConnectionTrait>(
        conn: &C,
        author_id: &str,
    ) -> AppResult<Vec<String>> {
        Answer::find()
            .select_only()
            .column(answer::Column::Id)
            .filter(answer::Column::AuthorId.eq(author_id))
            .filter(answer::Column::IsAccepted.eq(true))
            .order_by_asc(answer::Column::Id)
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Count currently accepted answers written by `author_id`.
    pub async fn count_accepted_by_author<C: ConnectionTrait>(
        conn: &C,
        author_id: &str,
    ) -> AppResult<u64> {
        Answer::find()
            .filter(answer::Column::AuthorId.eq(author_id))
            .filter(answer::Column::IsAccepted.eq(true))
            .count(conn)
            .await
            .map_err(db_err)
    }

    /// Count answers written by `author_id`.
    pub async fn count_by_author(&self, author_id: &str) -> AppResult<u64> {
        Answer::find()
            .filter(answer::Column::AuthorId.eq(author_id))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find answers by IDs, newest first.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<answer::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        Answer::find()
            .filter(answer::Column::Id.is_in(ids.iter().cloned()))
            .order_by_desc(answer::Column::CreatedAt)
            .order_by_desc(answer::Column::Id)
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

    fn create_test_answer(id: &str, question_id: &str, author_id: &str) -> answer::Model {
        answer::Model {
            id: id.to_string(),
            question_id: question_id.to_string(),
            content: "Clone it.".to_string(),
            author_id: author_id.to_string(),
            upvotes: 0,
            downvotes: 0,
            is_accepted: false,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<answer::Model>::new()])
            .into_connection();

        let result = AnswerRepository::get_by_id(&db, "missing").await;

        assert!(matches!(result, Err(AppError::AnswerNotFound(_))));
    }

    #[tokio::test]
    async fn test_find_accepted() {
        let mut accepted = create_test_answer("a1", "q1", "u2");
        accepted.is_accepted = true;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[accepted]])
            .into_connection();

        let result = AnswerRepository::find_accepted(&db, "q1").await.unwrap();

        assert_eq!(result.len(), 1);
        assert!(result[0].is_accepted);
    }

    #[tokio::test]
    async fn test_find_by_ids_empty_skips_query() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = AnswerRepository::new(db);
        assert!(repo.find_by_ids(&[]).await.unwrap().is_empty());
    }
}
