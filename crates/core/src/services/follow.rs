//! Follow service: users following users and tags.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set};
use stackit_common::{AppError, AppResult, IdGenerator, Metrics, get_metrics};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::{
        follow::{self, FollowType},
        notification::NotificationType,
        user,
    },
    repositories::{FollowRepository, UserCounter, UserRepository},
    run_atomic,
};

use crate::services::notification::{NewNotification, NotificationService};
use crate::services::tag::normalize_tag;
use crate::session::Session;

struct FollowUser<'a> {
    follower_id: &'a str,
    followee_id: &'a str,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for FollowUser<'a> {
    type Output = bool;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<bool> {
        UserRepository::get_by_id(txn, self.followee_id).await?;
        if FollowRepository::find_user_follow(txn, self.follower_id, self.followee_id)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let model = follow::ActiveModel {
            id: Set(self.id_gen.generate()),
            follower_id: Set(self.follower_id.to_string()),
            following_id: Set(Some(self.followee_id.to_string())),
            following_tag: Set(None),
            follow_type: Set(FollowType::User),
            created_at: Set(Utc::now().into()),
        };
        FollowRepository::create(txn, model).await?;
        UserRepository::adjust_counter(txn, self.follower_id, UserCounter::FollowingCount, 1)
            .await?;
        UserRepository::adjust_counter(txn, self.followee_id, UserCounter::FollowerCount, 1)
            .await?;
        Ok(true)
    }
}

struct UnfollowUser<'a> {
    follower_id: &'a str,
    followee_id: &'a str,
}

#[async_trait]
impl<'a> UnitOfWork for UnfollowUser<'a> {
    type Output = bool;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<bool> {
        let Some(existing) =
            FollowRepository::find_user_follow(txn, self.follower_id, self.followee_id).await?
        else {
            return Ok(false);
        };

        FollowRepository::delete(txn, &existing.id).await?;
        UserRepository::adjust_counter(txn, self.follower_id, UserCounter::FollowingCount, -1)
            .await?;
        UserRepository::adjust_counter(txn, self.followee_id, UserCounter::FollowerCount, -1)
            .await?;
        Ok(true)
    }
}

/// Follow service for business logic.
#[derive(Clone)]
pub struct FollowService {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    follow_repo: FollowRepository,
    user_repo: UserRepository,
    notifications: NotificationService,
    id_gen: IdGenerator,
}

impl FollowService {
    /// Create a new follow service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        policy: RetryPolicy,
        notifications: NotificationService,
    ) -> Self {
        Self {
            follow_repo: FollowRepository::new(db.clone()),
            user_repo: UserRepository::new(db.clone()),
            db,
            policy,
            notifications,
            id_gen: IdGenerator::new(),
        }
    }

    /// Follow a user. Returns false if already following.
    pub async fn follow_user(&self, session: &Session, followee_id: &str) -> AppResult<bool> {
        session.ensure_can_write()?;
        if session.user_id == followee_id {
            return Err(AppError::InvalidArgument(
                "You cannot follow yourself".to_string(),
            ));
        }

        let work = FollowUser {
            follower_id: &session.user_id,
            followee_id,
            id_gen: &self.id_gen,
        };
        let created = run_atomic(&self.db, &self.policy, &work).await?;
        if !created {
            return Ok(false);
        }

        Metrics::incr(&get_metrics().follows_created);
        tracing::info!(follower_id = %session.user_id, followee_id = %followee_id, "User followed");

        self.notifications
            .notify_after_commit(NewNotification {
                recipient_id: followee_id.to_string(),
                notification_type: NotificationType::Follow,
                message: format!("{} started following you", session.username),
                question_id: None,
                actor_id: Some(session.user_id.clone()),
            })
            .await;
        Ok(true)
    }

    /// Stop following a user. Returns false if not following.
    pub async fn unfollow_user(&self, session: &Session, followee_id: &str) -> AppResult<bool> {
        session.ensure_can_write()?;

        let work = UnfollowUser {
            follower_id: &session.user_id,
            followee_id,
        };
        let removed = run_atomic(&self.db, &self.policy, &work).await?;
        if removed {
            tracing::info!(follower_id = %session.user_id, followee_id = %followee_id, "User unfollowed");
        }
        Ok(removed)
    }

    /// Whether `follower_id` follows `followee_id`.
    pub async fn is_following(&self, follower_id: &str, followee_id: &str) -> AppResult<bool> {
        Ok(
            FollowRepository::find_user_follow(self.db.as_ref(), follower_id, followee_id)
                .await?
                .is_some(),
        )
    }

    /// Follow a tag. Returns false if already following.
    pub async fn follow_tag(&self, session: &Session, tag: &str) -> AppResult<bool> {
        session.ensure_can_write()?;
        let tag = normalize_tag(tag)?;

        if FollowRepository::find_tag_follow(self.db.as_ref(), &session.user_id, &tag)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let model = follow::ActiveModel {
            id: Set(self.id_gen.generate()),
            follower_id: Set(session.user_id.clone()),
            following_id: Set(None),
            following_tag: Set(Some(tag)),
            follow_type: Set(FollowType::Tag),
            created_at: Set(Utc::now().into()),
        };
        match FollowRepository::create(self.db.as_ref(), model).await {
            Ok(_) => Ok(true),
            // A concurrent request followed the same tag first.
            Err(AppError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Stop following a tag. Returns false if not following.
    pub async fn unfollow_tag(&self, session: &Session, tag: &str) -> AppResult<bool> {
        session.ensure_can_write()?;
        let tag = normalize_tag(tag)?;

        match FollowRepository::find_tag_follow(self.db.as_ref(), &session.user_id, &tag).await? {
            Some(existing) => {
                FollowRepository::delete(self.db.as_ref(), &existing.id).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tags a user follows.
    pub async fn followed_tags(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.follow_repo.find_followed_tags(user_id).await
    }

    /// Users following `user_id`, most recent first.
    pub async fn followers(&self, user_id: &str) -> AppResult<Vec<user::Model>> {
        let ids: Vec<String> = self
            .follow_repo
            .find_followers(user_id)
            .await?
            .into_iter()
            .map(|f| f.follower_id)
            .collect();
        self.users_in_order(&ids).await
    }

    /// Users `user_id` follows, most recent first.
    pub async fn following(&self, user_id: &str) -> AppResult<Vec<user::Model>> {
        let ids: Vec<String> = self
            .follow_repo
            .find_following(user_id)
            .await?
            .into_iter()
            .filter_map(|f| f.following_id)
            .collect();
        self.users_in_order(&ids).await
    }

    async fn users_in_order(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        let mut users = self.user_repo.find_by_ids(ids).await?;
        users.sort_by_key(|u| ids.iter().position(|id| *id == u.id));
        Ok(users)
    }
}
