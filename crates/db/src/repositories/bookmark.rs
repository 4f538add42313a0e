//! Bookmark repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Bookmark, bookmark};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use stackit_common::AppResult;

/// Bookmark repository for database operations.
#[derive(Clone)]
pub struct BookmarkRepository {
    db: Arc<DatabaseConnection>,
}

impl BookmarkRepository {
    /// Create a new bookmark repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user's bookmark of a question.
    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        question_id: &str,
    ) -> AppResult<Option<bookmark::Model>> {
        Bookmark::find()
            .filter(bookmark::Column::UserId.eq(user_id))
            .filter(bookmark::Column::QuestionId.eq(question_id))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Create a bookmark.
    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        model: bookmark::ActiveModel,
    ) -> AppResult<bookmark::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Delete a bookmark.
    pub async fn delete<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        Bookmark::delete_by_id(id)
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Delete every bookmark of a question.
    pub async fn delete_by_question<C: ConnectionTrait>(
        conn: &C,
        question_id: &str,
    ) -> AppResult<()> {
        Bookmark::delete_many()
            .filter(bookmark::Column::QuestionId.eq(question_id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Bookmarked question IDs of a user, most recent first.
    pub async fn question_ids_for_user(&self, user_id: &str) -> AppResult<Vec<String>> {
        let bookmarks = Bookmark::find()
            .filter(bookmark::Column::UserId.eq(user_id))
            .order_by_desc(bookmark::Column::CreatedAt)
            .order_by_desc(bookmark::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(bookmarks.into_iter().map(|b| b.question_id).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_question_ids_for_user() {
        let b = bookmark::Model {
            id: "b1".to_string(),
            user_id: "u1".to_string(),
            question_id: "q1".to_string(),
            created_at: Utc::now().into(),
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[b]])
                .into_connection(),
        );

        let repo = BookmarkRepository::new(db);
        let ids = repo.question_ids_for_user("u1").await.unwrap();

        assert_eq!(ids, vec!["q1".to_string()]);
    }
}
