//! Question repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Question, question};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::{Expr, Func, LikeExpr},
};
use stackit_common::{AppError, AppResult};

/// Question repository for database operations.
#[derive(Clone)]
pub struct QuestionRepository {
    db: Arc<DatabaseConnection>,
}

impl QuestionRepository {
    /// Create a new question repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a question by ID.
    pub async fn find_by_id<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<question::Model>> {
        Question::find_by_id(id).one(conn).await.map_err(db_err)
    }

    /// Get a question by ID, returning an error if not found.
    pub async fn get_by_id<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<question::Model> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| AppError::QuestionNotFound(id.to_string()))
    }

    /// Create a new question.
    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        model: question::ActiveModel,
    ) -> AppResult<question::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Update a question.
    pub async fn update<C: ConnectionTrait>(
        conn: &C,
        model: question::ActiveModel,
    ) -> AppResult<question::Model> {
        model.update(conn).await.map_err(db_err)
    }

    /// Delete a question row.
    pub async fn delete<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        Question::delete_by_id(id)
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Apply vote counter deltas in a single UPDATE.
    pub async fn adjust_votes<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        up_delta: i32,
        down_delta: i32,
    ) -> AppResult<()> {
        Question::update_many()
            .col_expr(
                question::Column::Upvotes,
                Expr::col(question::Column::Upvotes).add(up_delta),
            )
            .col_expr(
                question::Column::Downvotes,
                Expr::col(question::Column::Downvotes).add(down_delta),
            )
            .filter(question::Column::Id.eq(id))
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
        Question::update_many()
            .col_expr(question::Column::Upvotes, Expr::value(upvotes))
            .col_expr(question::Column::Downvotes, Expr::value(downvotes))
            .filter(question::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Increment the view counter. Returns false when the question does not exist.
    pub async fn increment_views(&self, id: &str) -> AppResult<bool> {
        let result = Question::update_many()
            .col_expr(
                question::Column::Views,
                Expr::col(question::Column::Views).add(1),
            )
            .filter(question::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    /// Add `delta` to the answer counter, never going below zero.
    pub async fn adjust_answer_count<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        delta: i32,
    ) -> AppResult<()> {
        let update = Question::update_many().filter(question::Column::Id.eq(id));
        let update = if delta >= 0 {
            update.col_expr(
                question::Column::AnswerCount,
                Expr::col(question::Column::AnswerCount).add(delta),
            )
        } else {
            update
                .col_expr(
                    question::Column::AnswerCount,
                    Expr::col(question::Column::AnswerCount).sub(-delta),
                )
                .filter(question::Column::AnswerCount.gte(-delta))
        };
        update.exec(conn).await.map_err(db_err)?;
        Ok(())
    }

    /// Set the acceptance fields together so `is_answered` always mirrors
    /// `accepted_answer_id`.
    pub async fn set_accepted_answer<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        answer_id: Option<&str>,
        now: chrono::DateTime<chrono::FixedOffset>,
    ) -> AppResult<()> {
        Question::update_many()
            .col_expr(
                question::Column::AcceptedAnswerId,
                Expr::value(answer_id.map(ToString::to_string)),
            )
            .col_expr(question::Column::IsAnswered, Expr::value(answer_id.is_some()))
            .col_expr(question::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(question::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Overwrite the answer counter (reconciliation).
    pub async fn set_answer_count<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        count: i32,
    ) -> AppResult<()> {
        Question::update_many()
            .col_expr(question::Column::AnswerCount, Expr::value(count))
            .filter(question::Column::Id.eq(id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Most recent questions first.
    pub async fn find_recent(&self, limit: u64) -> AppResult<Vec<question::Model>> {
        Question::find()
            .order_by_desc(question::Column::CreatedAt)
            .order_by_desc(question::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Find questions by IDs, newest first.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<question::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        Question::find()
            .filter(question::Column::Id.is_in(ids.iter().cloned()))
            .order_by_desc(question::Column::CreatedAt)
            .order_by_desc(question::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Questions whose title or description contains `term`, or whose ID is in
    /// `tagged_ids`. Newest first.
    pub async fn search(
        &self,
        term: &str,
        tagged_ids: &[String],
        limit: u64,
    ) -> AppResult<Vec<question::Model>> {
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let like = || LikeExpr::new(pattern.clone()).escape('\\');
        let mut condition = Condition::any()
            .add(Expr::expr(Func::lower(Expr::col(question::Column::Title))).like(like()))
            .add(Expr::expr(Func::lower(Expr::col(question::Column::Description))).like(like()));
        if !tagged_ids.is_empty() {
            condition = condition.add(question::Column::Id.is_in(tagged_ids.iter().cloned()));
        }

        Question::find()
            .filter(condition)
            .order_by_desc(question::Column::CreatedAt)
            .order_by_desc(question::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// IDs of questions written by `author_id`, oldest first.
    pub async fn ids_by_author<C: ConnectionTrait>(
        conn: &C,
        author_id: &str,
    ) -> AppResult<Vec<String>> {
        Question::find()
            .select_only()
            .column(question::Column::Id)
            .filter(question::Column::AuthorId.eq(author_id))
            .order_by_asc(question::Column::CreatedAt)
            .order_by_asc(question::Column::Id)
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// All question IDs.
    pub async fn all_ids<C: ConnectionTrait>(conn: &C) -> AppResult<Vec<String>> {
        Question::find()
            .select_only()
            .column(question::Column::Id)
            .order_by_asc(question::Column::Id)
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Count questions written by `author_id`.
    pub async fn count_by_author(&self, author_id: &str) -> AppResult<u64> {
        Question::find()
            .filter(question::Column::AuthorId.eq(author_id))
            .count(self.db.as_ref())
            .await
            .map_err(db_err)
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_question(id: &str, author_id: &str) -> question::Model {
        question::Model {
            id: id.to_string(),
            title: "How do I borrow twice?".to_string(),
            description: "<p>The checker says no.</p>".to_string(),
            author_id: author_id.to_string(),
            is_anonymous: false,
            upvotes: 0,
            downvotes: 0,
            views: 0,
            answer_count: 0,
            is_answered: false,
            accepted_answer_id: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<question::Model>::new()])
            .into_connection();

        let result = QuestionRepository::get_by_id(&db, "missing").await;

        assert!(matches!(result, Err(AppError::QuestionNotFound(id)) if id == "missing"));
    }

    #[tokio::test]
    async fn test_increment_views_reports_missing_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0,
                    },
                ])
                .into_connection(),
        );

        let repo = QuestionRepository::new(db);
        assert!(repo.increment_views("q1").await.unwrap());
        assert!(!repo.increment_views("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_recent() {
        let q1 = create_test_question("q2", "u1");
        let q2 = create_test_question("q1", "u1");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[q1, q2]])
                .into_connection(),
        );

        let repo = QuestionRepository::new(db);
        let result = repo.find_recent(10).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "q2");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("rust"), "rust");
    }

    #[test]
    fn test_score_is_derived() {
        let mut q = create_test_question("q1", "u1");
        q.upvotes = 3;
        q.downvotes = 5;
        assert_eq!(q.score(), -2);
    }
}
