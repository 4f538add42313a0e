//! Vote ledger.
//!
//! One live vote per (user, target). Casting the same direction again
//! removes the vote; casting the other direction flips it. The target's
//! `upvotes`/`downvotes` move in the same transaction as the vote row, and
//! the net score is always `upvotes - downvotes`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set};
use serde::Serialize;
use stackit_common::{AppResult, IdGenerator, Metrics, get_metrics};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::vote::{self, TargetType, VoteType},
    repositories::{AnswerRepository, QuestionRepository, VoteRepository},
    run_atomic,
};

use crate::services::event_bus::{EventBus, LedgerEvent};
use crate::session::Session;

/// The change one click makes to a (user, target) vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    /// The vote left in place, if any.
    pub next: Option<VoteType>,
    pub up_delta: i32,
    pub down_delta: i32,
}

impl VoteTransition {
    /// Transition from `current` when the user clicks `requested`.
    #[must_use]
    pub const fn between(current: Option<VoteType>, requested: VoteType) -> Self {
        let (next, up_delta, down_delta) = match (current, requested) {
            (None, VoteType::Up) => (Some(VoteType::Up), 1, 0),
            (None, VoteType::Down) => (Some(VoteType::Down), 0, 1),
            (Some(VoteType::Up), VoteType::Up) => (None, -1, 0),
            (Some(VoteType::Down), VoteType::Down) => (None, 0, -1),
            (Some(VoteType::Up), VoteType::Down) => (Some(VoteType::Down), -1, 1),
            (Some(VoteType::Down), VoteType::Up) => (Some(VoteType::Up), 1, -1),
        };
        Self {
            next,
            up_delta,
            down_delta,
        }
    }

    /// Change in net score.
    #[must_use]
    pub const fn score_delta(&self) -> i32 {
        self.up_delta - self.down_delta
    }
}

/// State of a target after a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteOutcome {
    pub target_id: String,
    pub target_type: TargetType,
    /// Question the target belongs to.
    pub question_id: String,
    /// The caller's vote after this call.
    pub vote: Option<VoteType>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
}

struct CastVote<'a> {
    user_id: &'a str,
    target_id: &'a str,
    target_type: TargetType,
    requested: VoteType,
    id_gen: &'a IdGenerator,
}

impl CastVote<'_> {
    /// Owning question of the target, or `NotFound`.
    async fn question_of(&self, txn: &DatabaseTransaction) -> AppResult<String> {
        Ok(match self.target_type {
            TargetType::Question => QuestionRepository::get_by_id(txn, self.target_id).await?.id,
            TargetType::Answer => {
                AnswerRepository::get_by_id(txn, self.target_id)
                    .await?
                    .question_id
            }
        })
    }

    async fn apply_counters(
        &self,
        txn: &DatabaseTransaction,
        step: VoteTransition,
    ) -> AppResult<(i32, i32)> {
        match self.target_type {
            TargetType::Question => {
                QuestionRepository::adjust_votes(txn, self.target_id, step.up_delta, step.down_delta)
                    .await?;
                let question = QuestionRepository::get_by_id(txn, self.target_id).await?;
                Ok((question.upvotes, question.downvotes))
            }
            TargetType::Answer => {
                AnswerRepository::adjust_votes(txn, self.target_id, step.up_delta, step.down_delta)
                    .await?;
                let answer = AnswerRepository::get_by_id(txn, self.target_id).await?;
                Ok((answer.upvotes, answer.downvotes))
            }
        }
    }
}

#[async_trait]
impl<'a> UnitOfWork for CastVote<'a> {
    type Output = VoteOutcome;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<VoteOutcome> {
        let question_id = self.question_of(txn).await?;
        let existing = VoteRepository::find(txn, self.user_id, self.target_id).await?;
        let step = VoteTransition::between(existing.as_ref().map(|v| v.vote_type), self.requested);
        let now = Utc::now();

        match (existing, step.next) {
            (None, Some(vote_type)) => {
                let model = vote::ActiveModel {
                    id: Set(self.id_gen.generate()),
                    user_id: Set(self.user_id.to_string()),
                    target_id: Set(self.target_id.to_string()),
                    target_type: Set(self.target_type),
                    vote_type: Set(vote_type),
                    created_at: Set(now.into()),
                    updated_at: Set(None),
                };
                VoteRepository::create(txn, model).await?;
            }
            (Some(existing), None) => VoteRepository::delete(txn, &existing.id).await?,
            (Some(existing), Some(vote_type)) => {
                VoteRepository::set_type(txn, &existing.id, vote_type, now.into()).await?;
            }
            (None, None) => {}
        }

        let (upvotes, downvotes) = self.apply_counters(txn, step).await?;
        Ok(VoteOutcome {
            target_id: self.target_id.to_string(),
            target_type: self.target_type,
            question_id,
            vote: step.next,
            upvotes,
            downvotes,
            score: upvotes - downvotes,
        })
    }
}

/// Vote service for business logic.
#[derive(Clone)]
pub struct VoteService {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    vote_repo: VoteRepository,
    event_bus: Option<EventBus>,
    id_gen: IdGenerator,
}

impl VoteService {
    /// Create a new vote service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, policy: RetryPolicy) -> Self {
        Self {
            vote_repo: VoteRepository::new(db.clone()),
            db,
            policy,
            event_bus: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event bus.
    pub fn set_event_bus(&mut self, event_bus: EventBus) {
        self.event_bus = Some(event_bus);
    }

    /// Cast, flip or withdraw the caller's vote on a question or answer.
    pub async fn cast_vote(
        &self,
        session: &Session,
        target_id: &str,
        target_type: TargetType,
        vote_type: VoteType,
    ) -> AppResult<VoteOutcome> {
        session.ensure_can_write()?;

        let work = CastVote {
            user_id: &session.user_id,
            target_id,
            target_type,
            requested: vote_type,
            id_gen: &self.id_gen,
        };
        let outcome = run_atomic(&self.db, &self.policy, &work).await?;

        Metrics::incr(&get_metrics().votes_cast);
        tracing::debug!(
            user_id = %session.user_id,
            target_id = %target_id,
            vote = ?outcome.vote,
            score = outcome.score,
            "Vote cast"
        );

        if let Some(ref bus) = self.event_bus {
            bus.publish(LedgerEvent::VoteChanged {
                question_id: outcome.question_id.clone(),
                target_id: outcome.target_id.clone(),
                target_type: outcome.target_type,
                upvotes: outcome.upvotes,
                downvotes: outcome.downvotes,
                score: outcome.score,
            });
        }
        Ok(outcome)
    }

    /// The user's live vote on each of `target_ids`.
    pub async fn user_votes(
        &self,
        user_id: &str,
        target_ids: &[String],
    ) -> AppResult<HashMap<String, Option<VoteType>>> {
        let mut votes: HashMap<String, Option<VoteType>> =
            target_ids.iter().map(|id| (id.clone(), None)).collect();
        for vote in self
            .vote_repo
            .find_by_user_and_targets(user_id, target_ids)
            .await?
        {
            votes.insert(vote.target_id, Some(vote.vote_type));
        }
        Ok(votes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[test]
    fn test_transition_table() {
        let cases = [
            (None, VoteType::Up, Some(VoteType::Up), 1),
            (None, VoteType::Down, Some(VoteType::Down), -1),
            (Some(VoteType::Up), VoteType::Up, None, -1),
            (Some(VoteType::Down), VoteType::Down, None, 1),
            (Some(VoteType::Up), VoteType::Down, Some(VoteType::Down), -2),
            (Some(VoteType::Down), VoteType::Up, Some(VoteType::Up), 2),
        ];
        for (current, requested, next, score_delta) in cases {
            let step = VoteTransition::between(current, requested);
            assert_eq!(step.next, next, "{current:?} + {requested:?}");
            assert_eq!(step.score_delta(), score_delta, "{current:?} + {requested:?}");
        }
    }

    #[test]
    fn test_same_vote_twice_returns_to_baseline() {
        for requested in [VoteType::Up, VoteType::Down] {
            let first = VoteTransition::between(None, requested);
            let second = VoteTransition::between(first.next, requested);
            assert_eq!(second.next, None);
            assert_eq!(first.score_delta() + second.score_delta(), 0);
            assert_eq!(first.up_delta + second.up_delta, 0);
            assert_eq!(first.down_delta + second.down_delta, 0);
        }
    }

    #[tokio::test]
    async fn test_user_votes_fills_missing_targets() {
        let vote = vote::Model {
            id: "v1".to_string(),
            user_id: "u1".to_string(),
            target_id: "q1".to_string(),
            target_type: TargetType::Question,
            vote_type: VoteType::Down,
            created_at: Utc::now().into(),
            updated_at: None,
        };
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[vote]])
                .into_connection(),
        );
        let service = VoteService::new(db, RetryPolicy::default());

        let votes = service
            .user_votes("u1", &["q1".to_string(), "a1".to_string()])
            .await
            .unwrap();

        assert_eq!(votes["q1"], Some(VoteType::Down));
        assert_eq!(votes["a1"], None);
    }
}
