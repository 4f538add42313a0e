//! Answer service.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set};
use serde::Deserialize;
use stackit_common::{AppError, AppResult, IdGenerator, Metrics, get_metrics};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::{answer, notification::NotificationType, question},
    repositories::{AnswerRepository, QuestionRepository, VoteRepository},
    run_atomic,
};
use validator::Validate;

use crate::services::acceptance::reopen_in;
use crate::services::counters::ContentCounters;
use crate::services::event_bus::{EventBus, LedgerEvent};
use crate::services::karma::{KarmaEvent, KarmaService};
use crate::services::notification::{NewNotification, NotificationService};
use crate::session::Session;

/// Input for posting or editing an answer.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AnswerInput {
    #[validate(length(min = 1))]
    pub content: String,
}

fn content_of(input: &AnswerInput) -> AppResult<String> {
    input.validate()?;
    let content = input.content.trim();
    if content.is_empty() {
        return Err(AppError::Validation(
            "content must not be blank".to_string(),
        ));
    }
    Ok(content.to_string())
}

struct PostAnswer<'a> {
    author_id: &'a str,
    question_id: &'a str,
    content: &'a str,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for PostAnswer<'a> {
    type Output = (answer::Model, question::Model);

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<Self::Output> {
        let question = QuestionRepository::get_by_id(txn, self.question_id).await?;

        let model = answer::ActiveModel {
            id: Set(self.id_gen.generate()),
            question_id: Set(question.id.clone()),
            content: Set(self.content.to_string()),
            author_id: Set(self.author_id.to_string()),
            upvotes: Set(0),
            downvotes: Set(0),
            is_accepted: Set(false),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };
        let answer = AnswerRepository::create(txn, model).await?;

        QuestionRepository::adjust_answer_count(txn, &question.id, 1).await?;
        ContentCounters::record_answer_in(txn, self.author_id, &answer.id).await?;
        Ok((answer, question))
    }
}

struct UpdateAnswer<'a> {
    caller_id: &'a str,
    answer_id: &'a str,
    content: &'a str,
}

#[async_trait]
impl<'a> UnitOfWork for UpdateAnswer<'a> {
    type Output = answer::Model;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<answer::Model> {
        let answer = AnswerRepository::get_by_id(txn, self.answer_id).await?;
        if answer.author_id != self.caller_id {
            return Err(AppError::Forbidden(
                "Only the author can edit this answer".to_string(),
            ));
        }

        let mut active: answer::ActiveModel = answer.into();
        active.content = Set(self.content.to_string());
        active.updated_at = Set(Some(Utc::now().into()));
        AnswerRepository::update(txn, active).await
    }
}

struct DeleteAnswer<'a> {
    session: &'a Session,
    answer_id: &'a str,
}

#[async_trait]
impl<'a> UnitOfWork for DeleteAnswer<'a> {
    type Output = answer::Model;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<answer::Model> {
        let answer = AnswerRepository::get_by_id(txn, self.answer_id).await?;
        if !self.session.can_moderate(&answer.author_id) {
            return Err(AppError::Forbidden(
                "Only the author or an admin can delete this answer".to_string(),
            ));
        }

        VoteRepository::delete_by_targets(txn, std::slice::from_ref(&answer.id)).await?;
        if answer.is_accepted {
            reopen_in(txn, &answer.question_id, &answer.id).await?;
        }
        QuestionRepository::adjust_answer_count(txn, &answer.question_id, -1).await?;
        ContentCounters::forget_answer_in(txn, &answer.author_id, &answer.id, answer.is_accepted)
            .await?;
        AnswerRepository::delete(txn, &answer.id).await?;
        Ok(answer)
    }
}

/// Answer service for business logic.
#[derive(Clone)]
pub struct AnswerService {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    karma: KarmaService,
    notifications: NotificationService,
    event_bus: Option<EventBus>,
    id_gen: IdGenerator,
}

impl AnswerService {
    /// Create a new answer service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        policy: RetryPolicy,
        karma: KarmaService,
        notifications: NotificationService,
    ) -> Self {
        Self {
            db,
            policy,
            karma,
            notifications,
            event_bus: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event bus.
    pub fn set_event_bus(&mut self, event_bus: EventBus) {
        self.event_bus = Some(event_bus);
    }

    /// Post an answer.
    ///
    /// The answer and the counters it moves commit together; karma, the
    /// contribution badge and the asker's notification follow.
    pub async fn post(
        &self,
        session: &Session,
        question_id: &str,
        input: AnswerInput,
    ) -> AppResult<answer::Model> {
        session.ensure_can_write()?;
        let content = content_of(&input)?;

        let work = PostAnswer {
            author_id: &session.user_id,
            question_id,
            content: &content,
            id_gen: &self.id_gen,
        };
        let (answer, question) = run_atomic(&self.db, &self.policy, &work).await?;

        Metrics::incr(&get_metrics().answers_posted);
        tracing::info!(
            answer_id = %answer.id,
            question_id = %question.id,
            author_id = %session.user_id,
            "Answer posted"
        );

        self.karma
            .award_after_commit(
                &session.user_id,
                &KarmaEvent::AnswerPosted {
                    answer_id: answer.id.clone(),
                },
            )
            .await;

        if question.author_id != session.user_id {
            self.notifications
                .notify_after_commit(NewNotification {
                    recipient_id: question.author_id.clone(),
                    notification_type: NotificationType::Answer,
                    message: format!(
                        "{} answered your question: {}",
                        session.username, question.title
                    ),
                    question_id: Some(question.id.clone()),
                    actor_id: Some(session.user_id.clone()),
                })
                .await;
        }

        if let Some(ref bus) = self.event_bus {
            bus.publish(LedgerEvent::AnswerPosted {
                question_id: question.id,
                answer_id: answer.id.clone(),
                author_id: session.user_id.clone(),
            });
        }
        Ok(answer)
    }

    /// Answers of a question: accepted first, then by score, then newest.
    pub async fn list_for_question(&self, question_id: &str) -> AppResult<Vec<answer::Model>> {
        QuestionRepository::get_by_id(self.db.as_ref(), question_id).await?;
        AnswerRepository::find_by_question(self.db.as_ref(), question_id).await
    }

    /// Get an answer.
    pub async fn get(&self, id: &str) -> AppResult<answer::Model> {
        AnswerRepository::get_by_id(self.db.as_ref(), id).await
    }

    /// Edit an answer. Only the author may edit.
    pub async fn update(
        &self,
        session: &Session,
        id: &str,
        input: AnswerInput,
    ) -> AppResult<answer::Model> {
        session.ensure_can_write()?;
        let content = content_of(&input)?;

        let work = UpdateAnswer {
            caller_id: &session.user_id,
            answer_id: id,
            content: &content,
        };
        run_atomic(&self.db, &self.policy, &work).await
    }

    /// Delete an answer. An accepted answer reopens its question.
    pub async fn delete(&self, session: &Session, id: &str) -> AppResult<answer::Model> {
        session.ensure_can_write()?;

        let work = DeleteAnswer {
            session,
            answer_id: id,
        };
        let deleted = run_atomic(&self.db, &self.policy, &work).await?;
        tracing::info!(
            answer_id = %id,
            question_id = %deleted.question_id,
            deleted_by = %session.user_id,
            was_accepted = deleted.is_accepted,
            "Answer deleted"
        );
        Ok(deleted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_of_trims() {
        let input = AnswerInput {
            content: "  Use Arc<Mutex<T>>  ".to_string(),
        };
        assert_eq!(content_of(&input).unwrap(), "Use Arc<Mutex<T>>");
    }

    #[test]
    fn test_content_of_rejects_blank() {
        for content in ["", "   "] {
            let input = AnswerInput {
                content: content.to_string(),
            };
            assert!(matches!(content_of(&input), Err(AppError::Validation(_))));
        }
    }
}
