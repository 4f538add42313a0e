//! Karma service.
//!
//! Every award is keyed by the logical event that earned it, so a retried
//! ask, answer or acceptance never pays out twice. Each award appends a
//! history row next to the counter update.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, Set};
use stackit_common::{AppResult, IdGenerator, get_metrics};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::{karma_history, user},
    repositories::{KarmaRepository, UserCounter, UserRepository},
    run_atomic,
};

/// Points for asking a question.
pub const ASK_QUESTION_POINTS: i32 = 5;
/// Points for posting an answer.
pub const POST_ANSWER_POINTS: i32 = 10;
/// Points for having an answer accepted, paid to the answer's author.
pub const ACCEPTED_ANSWER_POINTS: i32 = 25;

/// Unlocked by the first question or answer.
pub const FIRST_CONTRIBUTION_BADGE: &str = "First Contribution";
/// Unlocked by the first accepted answer.
pub const FIRST_ACCEPTED_ANSWER_BADGE: &str = "First Accepted Answer";

/// A rewardable event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KarmaEvent {
    QuestionAsked { question_id: String },
    AnswerPosted { answer_id: String },
    AnswerAccepted { answer_id: String },
}

impl KarmaEvent {
    /// Points paid for this event.
    #[must_use]
    pub const fn points(&self) -> i32 {
        match self {
            Self::QuestionAsked { .. } => ASK_QUESTION_POINTS,
            Self::AnswerPosted { .. } => POST_ANSWER_POINTS,
            Self::AnswerAccepted { .. } => ACCEPTED_ANSWER_POINTS,
        }
    }

    /// Reason recorded in the history.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::QuestionAsked { .. } => "Asked a question",
            Self::AnswerPosted { .. } => "Posted an answer",
            Self::AnswerAccepted { .. } => "Answer accepted",
        }
    }

    /// Badge this kind of event unlocks.
    #[must_use]
    pub const fn badge(&self) -> &'static str {
        match self {
            Self::QuestionAsked { .. } | Self::AnswerPosted { .. } => FIRST_CONTRIBUTION_BADGE,
            Self::AnswerAccepted { .. } => FIRST_ACCEPTED_ANSWER_BADGE,
        }
    }

    /// Unique key of the logical event.
    #[must_use]
    pub fn event_key(&self) -> String {
        match self {
            Self::QuestionAsked { question_id } => format!("question:{question_id}:asked"),
            Self::AnswerPosted { answer_id } => format!("answer:{answer_id}:posted"),
            Self::AnswerAccepted { answer_id } => format!("answer:{answer_id}:accepted"),
        }
    }
}

/// Result of an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KarmaAward {
    /// False when the event had already been rewarded.
    pub awarded: bool,
    /// Badge unlocked by this award.
    pub badge_unlocked: Option<&'static str>,
}

/// Karma writes that join the caller's transaction.
pub struct KarmaAccount;

impl KarmaAccount {
    /// Pay `event` to `user_id` unless it was already paid.
    pub async fn award_in<C: ConnectionTrait>(
        conn: &C,
        id_gen: &IdGenerator,
        user_id: &str,
        event: &KarmaEvent,
    ) -> AppResult<bool> {
        let event_key = event.event_key();
        if KarmaRepository::find_by_event_key(conn, &event_key)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let entry = karma_history::ActiveModel {
            id: Set(id_gen.generate()),
            user_id: Set(user_id.to_string()),
            points: Set(event.points()),
            reason: Set(event.reason().to_string()),
            event_key: Set(event_key),
            created_at: Set(Utc::now().into()),
        };
        KarmaRepository::create(conn, entry).await?;
        UserRepository::adjust_counter(conn, user_id, UserCounter::Karma, event.points()).await?;
        Ok(true)
    }

    /// Add `badge` to the user's set. Returns false when already unlocked.
    pub async fn unlock_badge_in<C: ConnectionTrait>(
        conn: &C,
        user_id: &str,
        badge: &str,
    ) -> AppResult<bool> {
        let user = UserRepository::get_by_id(conn, user_id).await?;
        if user.has_badge(badge) {
            return Ok(false);
        }

        let mut badges = user.badge_list();
        badges.push(badge.to_string());
        let mut active: user::ActiveModel = user.into();
        active.badges = Set(user::json_list(badges));
        UserRepository::update(conn, active).await?;
        Ok(true)
    }

    /// Pay `event` and unlock its badge.
    pub async fn reward_in<C: ConnectionTrait>(
        conn: &C,
        id_gen: &IdGenerator,
        user_id: &str,
        event: &KarmaEvent,
    ) -> AppResult<KarmaAward> {
        let awarded = Self::award_in(conn, id_gen, user_id, event).await?;
        let badge = event.badge();
        let unlocked = Self::unlock_badge_in(conn, user_id, badge).await?;
        Ok(KarmaAward {
            awarded,
            badge_unlocked: unlocked.then_some(badge),
        })
    }
}

struct Reward<'a> {
    user_id: &'a str,
    event: &'a KarmaEvent,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for Reward<'a> {
    type Output = KarmaAward;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<KarmaAward> {
        KarmaAccount::reward_in(txn, self.id_gen, self.user_id, self.event).await
    }
}

/// Karma service for awards outside a content transaction.
#[derive(Clone)]
pub struct KarmaService {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    karma_repo: KarmaRepository,
    id_gen: IdGenerator,
}

impl KarmaService {
    /// Create a new karma service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, policy: RetryPolicy) -> Self {
        Self {
            karma_repo: KarmaRepository::new(db.clone()),
            db,
            policy,
            id_gen: IdGenerator::new(),
        }
    }

    /// Pay `event` to `user_id` in its own transaction.
    pub async fn award(&self, user_id: &str, event: &KarmaEvent) -> AppResult<KarmaAward> {
        let work = Reward {
            user_id,
            event,
            id_gen: &self.id_gen,
        };
        run_atomic(&self.db, &self.policy, &work).await
    }

    /// Award after the triggering content has committed.
    ///
    /// Failure leaves the content in place. It is logged and counted, and
    /// [`ContentCounters::recount_user`] pays the missing award later.
    ///
    /// [`ContentCounters::recount_user`]: crate::services::counters::ContentCounters::recount_user
    pub async fn award_after_commit(&self, user_id: &str, event: &KarmaEvent) {
        match self.award(user_id, event).await {
            Ok(award) => {
                tracing::debug!(
                    user_id = %user_id,
                    event_key = %event.event_key(),
                    awarded = award.awarded,
                    badge = ?award.badge_unlocked,
                    "Karma awarded"
                );
            }
            Err(e) => {
                get_metrics().record_bookkeeping_failure();
                tracing::error!(
                    error = %e,
                    user_id = %user_id,
                    event_key = %event.event_key(),
                    "Failed to award karma"
                );
            }
        }
    }

    /// Newest karma history entries of a user.
    pub async fn history(&self, user_id: &str, limit: u64) -> AppResult<Vec<karma_history::Model>> {
        self.karma_repo.find_by_user(user_id, limit.clamp(1, 100)).await
    }
}
