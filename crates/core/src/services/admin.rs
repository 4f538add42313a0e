//! Admin service: bans, roles and counter repair.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use serde::Serialize;
use stackit_common::{AppError, AppResult};
use stackit_db::{
    entities::user::{self, Role},
    repositories::UserRepository,
};

use crate::services::counters::{ContentCounters, QuestionCounts, RecountSummary, UserCounts};
use crate::session::Session;

/// Default page size for [`AdminService::list_users`].
pub const USER_PAGE: u64 = 50;

/// A page of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPage {
    pub users: Vec<user::Model>,
    pub total: u64,
}

/// Admin service for business logic.
#[derive(Clone)]
pub struct AdminService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    counters: ContentCounters,
}

impl AdminService {
    /// Create a new admin service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, counters: ContentCounters) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            db,
            counters,
        }
    }

    /// Ban or unban a user.
    pub async fn set_banned(
        &self,
        session: &Session,
        user_id: &str,
        banned: bool,
    ) -> AppResult<user::Model> {
        session.ensure_admin()?;
        if session.user_id == user_id && banned {
            return Err(AppError::InvalidArgument(
                "Admins cannot ban themselves".to_string(),
            ));
        }

        let user = UserRepository::get_by_id(self.db.as_ref(), user_id).await?;
        let mut active: user::ActiveModel = user.into();
        active.is_banned = Set(banned);
        active.updated_at = Set(Some(Utc::now().into()));
        let user = UserRepository::update(self.db.as_ref(), active).await?;

        tracing::warn!(user_id = %user_id, banned, admin_id = %session.user_id, "User ban state changed");
        Ok(user)
    }

    /// Change a user's role.
    pub async fn set_role(
        &self,
        session: &Session,
        user_id: &str,
        role: Role,
    ) -> AppResult<user::Model> {
        session.ensure_admin()?;

        let user = UserRepository::get_by_id(self.db.as_ref(), user_id).await?;
        let mut active: user::ActiveModel = user.into();
        active.role = Set(role);
        active.updated_at = Set(Some(Utc::now().into()));
        let user = UserRepository::update(self.db.as_ref(), active).await?;

        tracing::info!(user_id = %user_id, role = ?role, admin_id = %session.user_id, "User role changed");
        Ok(user)
    }

    /// List users, oldest first.
    pub async fn list_users(
        &self,
        session: &Session,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> AppResult<UserPage> {
        session.ensure_admin()?;
        let limit = limit.unwrap_or(USER_PAGE).clamp(1, 200);
        let users = self.user_repo.list(limit, offset.unwrap_or(0)).await?;
        let total = self.user_repo.count().await?;
        Ok(UserPage { users, total })
    }

    /// Re-derive a user's counters from content.
    pub async fn recount_user(&self, session: &Session, user_id: &str) -> AppResult<UserCounts> {
        session.ensure_admin()?;
        self.counters.recount_user(user_id).await
    }

    /// Re-derive a question's vote, answer and acceptance fields.
    pub async fn recount_question(
        &self,
        session: &Session,
        question_id: &str,
    ) -> AppResult<QuestionCounts> {
        session.ensure_admin()?;
        self.counters.recount_question(question_id).await
    }

    /// Re-derive every tag's question count. Returns how many tags were checked.
    pub async fn recount_tags(&self, session: &Session) -> AppResult<usize> {
        session.ensure_admin()?;
        self.counters.recount_tags().await
    }

    /// Recount everything.
    pub async fn recount_all(&self, session: &Session) -> AppResult<RecountSummary> {
        session.ensure_admin()?;
        tracing::info!(admin_id = %session.user_id, "Full recount started");
        self.counters.recount_all().await
    }
}
