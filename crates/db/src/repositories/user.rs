//! User repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{User, user};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};
use stackit_common::{AppError, AppResult};

/// Denormalized counters stored on the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCounter {
    Karma,
    FollowerCount,
    FollowingCount,
    QuestionsCount,
    AnswersCount,
    AcceptedAnswers,
}

impl UserCounter {
    const fn column(self) -> user::Column {
        match self {
            Self::Karma => user::Column::Karma,
            Self::FollowerCount => user::Column::FollowerCount,
            Self::FollowingCount => user::Column::FollowingCount,
            Self::QuestionsCount => user::Column::QuestionsCount,
            Self::AnswersCount => user::Column::AnswersCount,
            Self::AcceptedAnswers => user::Column::AcceptedAnswers,
        }
    }
}

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id<C: ConnectionTrait>(
        conn: &C,
        id: &str,
    ) -> AppResult<Option<user::Model>> {
        User::find_by_id(id).one(conn).await.map_err(db_err)
    }

    /// Get a user by ID, returning an error if not found.
    pub async fn get_by_id<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<user::Model> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Find a user by username (case-insensitive).
    pub async fn find_by_username<C: ConnectionTrait>(
        conn: &C,
        username: &str,
    ) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::UsernameLower.eq(username.to_lowercase()))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Find a user by email (case-insensitive).
    pub async fn find_by_email<C: ConnectionTrait>(
        conn: &C,
        email: &str,
    ) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Email.eq(email.to_lowercase()))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Find a user by session token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Create a new user.
    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        model: user::ActiveModel,
    ) -> AppResult<user::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Update a user.
    pub async fn update<C: ConnectionTrait>(
        conn: &C,
        model: user::ActiveModel,
    ) -> AppResult<user::Model> {
        model.update(conn).await.map_err(db_err)
    }

    /// Add `delta` to a counter in a single UPDATE.
    ///
    /// Decrements never take a counter below zero.
    pub async fn adjust_counter<C: ConnectionTrait>(
        conn: &C,
        id: &str,
        counter: UserCounter,
        delta: i32,
    ) -> AppResult<()> {
        if delta == 0 {
            return Ok(());
        }
        let col = counter.column();
        let update = User::update_many().filter(user::Column::Id.eq(id));
        let update = if delta > 0 {
            update.col_expr(col, Expr::col(col).add(delta))
        } else {
            update
                .col_expr(col, Expr::col(col).sub(-delta))
                .filter(col.gte(-delta))
        };
        update.exec(conn).await.map_err(db_err)?;
        Ok(())
    }

    /// Find users by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        User::find()
            .filter(user::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Users ordered by karma, highest first. Ties are broken by ID.
    pub async fn top_by_karma(&self, limit: u64) -> AppResult<Vec<user::Model>> {
        User::find()
            .order_by_desc(user::Column::Karma)
            .order_by_asc(user::Column::Id)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// 1-based leaderboard position of `user`.
    pub async fn rank_of(&self, user: &user::Model) -> AppResult<u64> {
        let ahead = User::find()
            .filter(
                Condition::any()
                    .add(user::Column::Karma.gt(user.karma))
                    .add(
                        Condition::all()
                            .add(user::Column::Karma.eq(user.karma))
                            .add(user::Column::Id.lt(user.id.as_str())),
                    ),
            )
            .count(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(ahead + 1)
    }

    /// Count all users.
    pub async fn count(&self) -> AppResult<u64> {
        User::find().count(self.db.as_ref()).await.map_err(db_err)
    }

    /// List users, oldest first.
    pub async fn list(&self, limit: u64, offset: u64) -> AppResult<Vec<user::Model>> {
        User::find()
            .order_by_asc(user::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// All user IDs.
    pub async fn all_ids<C: ConnectionTrait>(conn: &C) -> AppResult<Vec<String>> {
        User::find()
            .select_only()
            .column(user::Column::Id)
            .order_by_asc(user::Column::Id)
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(db_err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::user::{Role, json_list};
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_user(id: &str, username: &str, karma: i32) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: username.to_string(),
            username_lower: username.to_lowercase(),
            email: format!("{}@example.com", username.to_lowercase()),
            token: Some(format!("token-{id}")),
            password_hash: String::new(),
            avatar_url: None,
            bio: None,
            role: Role::User,
            karma,
            badges: json_list(Vec::<String>::new()),
            is_banned: false,
            follower_count: 0,
            following_count: 0,
            questions_count: 0,
            answers_count: 0,
            accepted_answers: 0,
            question_ids: json_list(Vec::<String>::new()),
            answer_ids: json_list(Vec::<String>::new()),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_by_id_not_found_returns_error() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .into_connection();

        let result = UserRepository::get_by_id(&db, "nonexistent").await;

        match result {
            Err(AppError::UserNotFound(id)) => assert_eq!(id, "nonexistent"),
            other => panic!("Expected UserNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_by_token() {
        let user = create_test_user("u1", "Alice", 0);

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user.clone()]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let found = repo.find_by_token("token-u1").await.unwrap().unwrap();

        assert_eq!(found.id, "u1");
        assert_eq!(found.username_lower, "alice");
    }

    #[tokio::test]
    async fn test_adjust_counter_issues_single_update() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        UserRepository::adjust_counter(&db, "u1", UserCounter::Karma, 25)
            .await
            .unwrap();

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 1);
        assert!(format!("{:?}", log[0]).contains("UPDATE"));
    }

    #[tokio::test]
    async fn test_adjust_counter_zero_is_noop() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        UserRepository::adjust_counter(&db, "u1", UserCounter::AnswersCount, 0)
            .await
            .unwrap();

        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_top_by_karma() {
        let users = vec![
            create_test_user("u2", "bob", 35),
            create_test_user("u1", "alice", 5),
        ];

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([users])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let result = repo.top_by_karma(100).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].karma, 35);
    }
}
