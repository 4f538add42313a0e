//! Follow repository.

use std::sync::Arc;

use crate::db_err;
use crate::entities::{Follow, follow};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use stackit_common::AppResult;

/// Follow repository for database operations.
#[derive(Clone)]
pub struct FollowRepository {
    db: Arc<DatabaseConnection>,
}

impl FollowRepository {
    /// Create a new follow repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user-follows-user relation.
    pub async fn find_user_follow<C: ConnectionTrait>(
        conn: &C,
        follower_id: &str,
        following_id: &str,
    ) -> AppResult<Option<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FollowingId.eq(following_id))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Find a user-follows-tag relation.
    pub async fn find_tag_follow<C: ConnectionTrait>(
        conn: &C,
        follower_id: &str,
        tag: &str,
    ) -> AppResult<Option<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::FollowingTag.eq(tag))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Create a follow relation.
    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        model: follow::ActiveModel,
    ) -> AppResult<follow::Model> {
        model.insert(conn).await.map_err(db_err)
    }

    /// Delete a follow relation.
    pub async fn delete<C: ConnectionTrait>(conn: &C, id: &str) -> AppResult<()> {
        Follow::delete_by_id(id).exec(conn).await.map_err(db_err)?;
        Ok(())
    }

    /// Count users following `user_id`.
    pub async fn count_followers<C: ConnectionTrait>(conn: &C, user_id: &str) -> AppResult<u64> {
        Follow::find()
            .filter(follow::Column::FollowType.eq(follow::FollowType::User))
            .filter(follow::Column::FollowingId.eq(user_id))
            .count(conn)
            .await
            .map_err(db_err)
    }

    /// Count users `user_id` follows.
    pub async fn count_following<C: ConnectionTrait>(conn: &C, user_id: &str) -> AppResult<u64> {
        Follow::find()
            .filter(follow::Column::FollowType.eq(follow::FollowType::User))
            .filter(follow::Column::FollowerId.eq(user_id))
            .count(conn)
            .await
            .map_err(db_err)
    }

    /// Relations where someone follows `user_id`, newest first.
    pub async fn find_followers(&self, user_id: &str) -> AppResult<Vec<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowType.eq(follow::FollowType::User))
            .filter(follow::Column::FollowingId.eq(user_id))
            .order_by_desc(follow::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Relations where `user_id` follows another user, newest first.
    pub async fn find_following(&self, user_id: &str) -> AppResult<Vec<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowType.eq(follow::FollowType::User))
            .filter(follow::Column::FollowerId.eq(user_id))
            .order_by_desc(follow::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Tags `user_id` follows, alphabetically.
    pub async fn find_followed_tags(&self, user_id: &str) -> AppResult<Vec<String>> {
        let follows = Follow::find()
            .filter(follow::Column::FollowType.eq(follow::FollowType::Tag))
            .filter(follow::Column::FollowerId.eq(user_id))
            .order_by_asc(follow::Column::FollowingTag)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        Ok(follows.into_iter().filter_map(|f| f.following_tag).collect())
    }
}
