//! Bookmark service.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set};
use stackit_common::{AppResult, IdGenerator};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::bookmark,
    repositories::{BookmarkRepository, QuestionRepository},
    run_atomic,
};

use crate::services::question::{QuestionDetail, QuestionService};
use crate::session::Session;

struct ToggleBookmark<'a> {
    user_id: &'a str,
    question_id: &'a str,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for ToggleBookmark<'a> {
    type Output = bool;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<bool> {
        QuestionRepository::get_by_id(txn, self.question_id).await?;

        if let Some(existing) = BookmarkRepository::find(txn, self.user_id, self.question_id).await?
        {
            BookmarkRepository::delete(txn, &existing.id).await?;
            return Ok(false);
        }

        let model = bookmark::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(self.user_id.to_string()),
            question_id: Set(self.question_id.to_string()),
            created_at: Set(Utc::now().into()),
        };
        BookmarkRepository::create(txn, model).await?;
        Ok(true)
    }
}

/// Bookmark service for business logic.
#[derive(Clone)]
pub struct BookmarkService {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    bookmark_repo: BookmarkRepository,
    questions: QuestionService,
    id_gen: IdGenerator,
}

impl BookmarkService {
    /// Create a new bookmark service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        policy: RetryPolicy,
        questions: QuestionService,
    ) -> Self {
        Self {
            bookmark_repo: BookmarkRepository::new(db.clone()),
            db,
            policy,
            questions,
            id_gen: IdGenerator::new(),
        }
    }

    /// Bookmark the question, or remove the bookmark. Returns whether it is now bookmarked.
    pub async fn toggle_bookmark(&self, session: &Session, question_id: &str) -> AppResult<bool> {
        session.ensure_can_write()?;

        let work = ToggleBookmark {
            user_id: &session.user_id,
            question_id,
            id_gen: &self.id_gen,
        };
        let bookmarked = run_atomic(&self.db, &self.policy, &work).await?;
        tracing::debug!(user_id = %session.user_id, question_id = %question_id, bookmarked, "Bookmark toggled");
        Ok(bookmarked)
    }

    /// A user's bookmarked questions, most recently bookmarked first.
    pub async fn bookmarked_questions(&self, user_id: &str) -> AppResult<Vec<QuestionDetail>> {
        let ids = self.bookmark_repo.question_ids_for_user(user_id).await?;
        self.questions.find_by_ids(&ids).await
    }
}
