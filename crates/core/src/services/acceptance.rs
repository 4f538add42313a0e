//! Answer acceptance.
//!
//! A question is `Open` until its author accepts an answer, then
//! `Answered`. Accepting a different answer later moves the flag; karma
//! already paid for an earlier acceptance stays paid.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction};
use serde::Serialize;
use stackit_common::{AppError, AppResult, IdGenerator, Metrics, get_metrics};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::{notification::NotificationType, question},
    repositories::{AnswerRepository, QuestionRepository, UserCounter, UserRepository},
    run_atomic,
};

use crate::services::event_bus::{EventBus, LedgerEvent};
use crate::services::karma::{KarmaAccount, KarmaEvent};
use crate::services::notification::{NewNotification, NotificationService};
use crate::session::Session;

/// Acceptance state of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AcceptanceState {
    /// No accepted answer.
    Open,
    /// Exactly one accepted answer.
    Answered { accepted_answer_id: String },
}

impl AcceptanceState {
    /// State stored on a question row.
    #[must_use]
    pub fn of(question: &question::Model) -> Self {
        match (&question.accepted_answer_id, question.is_answered) {
            (Some(id), true) => Self::Answered {
                accepted_answer_id: id.clone(),
            },
            _ => Self::Open,
        }
    }
}

/// Result of an accept call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceOutcome {
    pub question_id: String,
    pub answer_id: String,
    /// Previously accepted answer that lost the flag.
    pub previous_answer_id: Option<String>,
    /// False when the answer was already the accepted one.
    pub changed: bool,
    /// Whether acceptance karma was paid by this call.
    pub karma_awarded: bool,
    pub state: AcceptanceState,
    #[serde(skip)]
    answer_author_id: String,
    #[serde(skip)]
    question_title: String,
}

/// Return a question to `Open` when its accepted answer disappears.
pub async fn reopen_in<C: ConnectionTrait>(
    conn: &C,
    question_id: &str,
    answer_id: &str,
) -> AppResult<()> {
    let question = QuestionRepository::get_by_id(conn, question_id).await?;
    if question.accepted_answer_id.as_deref() == Some(answer_id) {
        QuestionRepository::set_accepted_answer(conn, question_id, None, Utc::now().into())
            .await?;
    }
    Ok(())
}

struct AcceptAnswer<'a> {
    caller_id: &'a str,
    question_id: &'a str,
    answer_id: &'a str,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for AcceptAnswer<'a> {
    type Output = AcceptanceOutcome;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<AcceptanceOutcome> {
        let question = QuestionRepository::get_by_id(txn, self.question_id).await?;
        if question.author_id != self.caller_id {
            return Err(AppError::Forbidden(
                "Only the asker can accept an answer".to_string(),
            ));
        }

        let answer = AnswerRepository::get_by_id(txn, self.answer_id).await?;
        if answer.question_id != question.id {
            return Err(AppError::InvalidArgument(format!(
                "Answer {} does not belong to question {}",
                answer.id, question.id
            )));
        }

        if answer.is_accepted && question.accepted_answer_id.as_deref() == Some(answer.id.as_str())
        {
            return Ok(AcceptanceOutcome {
                question_id: question.id.clone(),
                answer_id: answer.id.clone(),
                previous_answer_id: None,
                changed: false,
                karma_awarded: false,
                state: AcceptanceState::of(&question),
                answer_author_id: answer.author_id,
                question_title: question.title,
            });
        }

        // Clear every flagged answer, not just the one the question points at.
        let mut previous_answer_id = None;
        for previous in AnswerRepository::find_accepted(txn, &question.id).await? {
            if previous.id == answer.id {
                continue;
            }
            AnswerRepository::set_accepted(txn, &previous.id, false).await?;
            UserRepository::adjust_counter(
                txn,
                &previous.author_id,
                UserCounter::AcceptedAnswers,
                -1,
            )
            .await?;
            previous_answer_id = Some(previous.id);
        }

        AnswerRepository::set_accepted(txn, &answer.id, true).await?;
        if !answer.is_accepted {
            UserRepository::adjust_counter(txn, &answer.author_id, UserCounter::AcceptedAnswers, 1)
                .await?;
        }
        QuestionRepository::set_accepted_answer(
            txn,
            &question.id,
            Some(&answer.id),
            Utc::now().into(),
        )
        .await?;

        let event = KarmaEvent::AnswerAccepted {
            answer_id: answer.id.clone(),
        };
        let award = KarmaAccount::reward_in(txn, self.id_gen, &answer.author_id, &event).await?;

        Ok(AcceptanceOutcome {
            question_id: question.id,
            answer_id: answer.id.clone(),
            previous_answer_id,
            changed: true,
            karma_awarded: award.awarded,
            state: AcceptanceState::Answered {
                accepted_answer_id: answer.id,
            },
            answer_author_id: answer.author_id,
            question_title: question.title,
        })
    }
}

/// Acceptance service for business logic.
#[derive(Clone)]
pub struct AcceptanceService {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    notifications: NotificationService,
    event_bus: Option<EventBus>,
    id_gen: IdGenerator,
}

impl AcceptanceService {
    /// Create a new acceptance service.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        policy: RetryPolicy,
        notifications: NotificationService,
    ) -> Self {
        Self {
            db,
            policy,
            notifications,
            event_bus: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event bus.
    pub fn set_event_bus(&mut self, event_bus: EventBus) {
        self.event_bus = Some(event_bus);
    }

    /// Accept `answer_id` as the answer to `question_id`.
    pub async fn accept_answer(
        &self,
        session: &Session,
        question_id: &str,
        answer_id: &str,
    ) -> AppResult<AcceptanceOutcome> {
        session.ensure_can_write()?;

        let work = AcceptAnswer {
            caller_id: &session.user_id,
            question_id,
            answer_id,
            id_gen: &self.id_gen,
        };
        let outcome = run_atomic(&self.db, &self.policy, &work).await?;
        if !outcome.changed {
            return Ok(outcome);
        }

        Metrics::incr(&get_metrics().answers_accepted);
        tracing::info!(
            question_id = %outcome.question_id,
            answer_id = %outcome.answer_id,
            previous_answer_id = ?outcome.previous_answer_id,
            "Answer accepted"
        );

        if outcome.answer_author_id != session.user_id {
            self.notifications
                .notify_after_commit(NewNotification {
                    recipient_id: outcome.answer_author_id.clone(),
                    notification_type: NotificationType::Accept,
                    message: format!(
                        "Your answer was accepted for: {}",
                        outcome.question_title
                    ),
                    question_id: Some(outcome.question_id.clone()),
                    actor_id: Some(session.user_id.clone()),
                })
                .await;
        }

        if let Some(ref bus) = self.event_bus {
            bus.publish(LedgerEvent::AnswerAccepted {
                question_id: outcome.question_id.clone(),
                answer_id: outcome.answer_id.clone(),
                previous_answer_id: outcome.previous_answer_id.clone(),
            });
        }
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn question(accepted: Option<&str>) -> question::Model {
        question::Model {
            id: "q1".to_string(),
            title: "Borrowing across awaits".to_string(),
            description: "<p>How?</p>".to_string(),
            author_id: "u1".to_string(),
            is_anonymous: false,
            upvotes: 0,
            downvotes: 0,
            views: 0,
            answer_count: 1,
            is_answered: accepted.is_some(),
            accepted_answer_id: accepted.map(ToString::to_string),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[test]
    fn test_state_of_question() {
        assert_eq!(AcceptanceState::of(&question(None)), AcceptanceState::Open);
        assert_eq!(
            AcceptanceState::of(&question(Some("a1"))),
            AcceptanceState::Answered {
                accepted_answer_id: "a1".to_string()
            }
        );
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let json = serde_json::to_value(AcceptanceState::of(&question(Some("a1")))).unwrap();
        assert_eq!(json["state"], "answered");
        assert_eq!(json["acceptedAnswerId"], "a1");
    }

    #[tokio::test]
    async fn test_non_author_is_forbidden_before_any_write() {
        use sea_orm::{DatabaseBackend, MockDatabase};

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[question(None)]])
            .into_connection();
        let policy = RetryPolicy::default();
        let work = AcceptAnswer {
            caller_id: "u9",
            question_id: "q1",
            answer_id: "a1",
            id_gen: &IdGenerator::new(),
        };

        let err = run_atomic(&db, &policy, &work).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
