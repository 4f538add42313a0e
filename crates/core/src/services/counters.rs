//! Content counters.
//!
//! The `*_in` helpers keep denormalized counters in step with content
//! writes inside the caller's transaction. The `recount_*` operations
//! rebuild them from the content tables and are the repair path for drift.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, Set};
use serde::Serialize;
use stackit_common::{AppResult, IdGenerator};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::user,
    repositories::{
        AnswerRepository, FollowRepository, KarmaRepository, QuestionRepository, TagRepository,
        UserCounter, UserRepository, VoteRepository,
    },
    run_atomic,
};

use crate::services::karma::{KarmaAccount, KarmaEvent};

/// User counters after a recount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounts {
    pub user_id: String,
    pub karma: i32,
    pub questions_count: i32,
    pub answers_count: i32,
    pub accepted_answers: i32,
    pub follower_count: i32,
    pub following_count: i32,
    /// Rewards paid by the replay because their award had been lost.
    pub rewards_restored: usize,
    /// Whether any stored value was wrong.
    pub repaired: bool,
}

/// Question counters after a recount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionCounts {
    pub question_id: String,
    pub upvotes: i32,
    pub downvotes: i32,
    pub answer_count: i32,
    pub accepted_answer_id: Option<String>,
}

/// Totals of a full recount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecountSummary {
    pub questions: usize,
    pub users: usize,
    pub users_repaired: usize,
    pub tags: usize,
}

/// Content counter maintenance.
#[derive(Clone)]
pub struct ContentCounters {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    id_gen: IdGenerator,
}

impl ContentCounters {
    /// Create a new counter service.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>, policy: RetryPolicy) -> Self {
        Self {
            db,
            policy,
            id_gen: IdGenerator::new(),
        }
    }

    // === In-transaction bookkeeping ===

    /// Count a new question and append it to the author's list.
    pub async fn record_question_in<C: ConnectionTrait>(
        conn: &C,
        author_id: &str,
        question_id: &str,
    ) -> AppResult<()> {
        let author = UserRepository::get_by_id(conn, author_id).await?;
        UserRepository::adjust_counter(conn, author_id, UserCounter::QuestionsCount, 1).await?;

        let mut ids = author.question_id_list();
        ids.push(question_id.to_string());
        let mut active: user::ActiveModel = author.into();
        active.question_ids = Set(user::json_list(ids));
        UserRepository::update(conn, active).await?;
        Ok(())
    }

    /// Count a new answer and append it to the author's list.
    pub async fn record_answer_in<C: ConnectionTrait>(
        conn: &C,
        author_id: &str,
        answer_id: &str,
    ) -> AppResult<()> {
        let author = UserRepository::get_by_id(conn, author_id).await?;
        UserRepository::adjust_counter(conn, author_id, UserCounter::AnswersCount, 1).await?;

        let mut ids = author.answer_id_list();
        ids.push(answer_id.to_string());
        let mut active: user::ActiveModel = author.into();
        active.answer_ids = Set(user::json_list(ids));
        UserRepository::update(conn, active).await?;
        Ok(())
    }

    /// Uncount a deleted question.
    pub async fn forget_question_in<C: ConnectionTrait>(
        conn: &C,
        author_id: &str,
        question_id: &str,
    ) -> AppResult<()> {
        let Some(author) = UserRepository::find_by_id(conn, author_id).await? else {
            return Ok(());
        };
        UserRepository::adjust_counter(conn, author_id, UserCounter::QuestionsCount, -1).await?;

        let ids: Vec<String> = author
            .question_id_list()
            .into_iter()
            .filter(|id| id != question_id)
            .collect();
        let mut active: user::ActiveModel = author.into();
        active.question_ids = Set(user::json_list(ids));
        UserRepository::update(conn, active).await?;
        Ok(())
    }

    /// Uncount a deleted answer.
    pub async fn forget_answer_in<C: ConnectionTrait>(
        conn: &C,
        author_id: &str,
        answer_id: &str,
        was_accepted: bool,
    ) -> AppResult<()> {
        let Some(author) = UserRepository::find_by_id(conn, author_id).await? else {
            return Ok(());
        };
        UserRepository::adjust_counter(conn, author_id, UserCounter::AnswersCount, -1).await?;
        if was_accepted {
            UserRepository::adjust_counter(conn, author_id, UserCounter::AcceptedAnswers, -1)
                .await?;
        }

        let ids: Vec<String> = author
            .answer_id_list()
            .into_iter()
            .filter(|id| id != answer_id)
            .collect();
        let mut active: user::ActiveModel = author.into();
        active.answer_ids = Set(user::json_list(ids));
        UserRepository::update(conn, active).await?;
        Ok(())
    }

    // === Reconciliation ===

    /// Rebuild a user's counters from the content tables.
    ///
    /// Rewards for the user's questions, answers and accepted answers are
    /// replayed first, so awards lost after a content commit are paid and
    /// their badges unlocked. Event keys keep the replay from paying twice.
    pub async fn recount_user(&self, user_id: &str) -> AppResult<UserCounts> {
        let work = RecountUser {
            user_id,
            id_gen: &self.id_gen,
        };
        let counts = run_atomic(&self.db, &self.policy, &work).await?;
        if counts.repaired {
            tracing::info!(user_id = %user_id, counts = ?counts, "Repaired user counters");
        }
        Ok(counts)
    }

    /// Rebuild a question's vote counters, answer count and acceptance fields.
    ///
    /// Extra accepted answers are cleared, which can move `acceptedAnswers`
    /// of their authors; [`Self::recount_all`] recounts users afterwards.
    pub async fn recount_question(&self, question_id: &str) -> AppResult<QuestionCounts> {
        run_atomic(&self.db, &self.policy, &RecountQuestion { question_id }).await
    }

    /// Rebuild every tag's question count. Returns how many tags were visited.
    pub async fn recount_tags(&self) -> AppResult<usize> {
        run_atomic(&self.db, &self.policy, &RecountTags).await
    }

    /// Recount every question, then every user, then the tags.
    pub async fn recount_all(&self) -> AppResult<RecountSummary> {
        let mut summary = RecountSummary::default();

        for question_id in QuestionRepository::all_ids(self.db.as_ref()).await? {
            self.recount_question(&question_id).await?;
            summary.questions += 1;
        }
        for user_id in UserRepository::all_ids(self.db.as_ref()).await? {
            if self.recount_user(&user_id).await?.repaired {
                summary.users_repaired += 1;
            }
            summary.users += 1;
        }
        summary.tags = self.recount_tags().await?;

        tracing::info!(summary = ?summary, "Full recount finished");
        Ok(summary)
    }
}

fn to_count(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

struct RecountUser<'a> {
    user_id: &'a str,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for RecountUser<'a> {
    type Output = UserCounts;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<UserCounts> {
        let question_ids = QuestionRepository::ids_by_author(txn, self.user_id).await?;
        let answer_ids = AnswerRepository::ids_by_author(txn, self.user_id).await?;
        let accepted_ids = AnswerRepository::accepted_ids_by_author(txn, self.user_id).await?;

        let events = question_ids
            .iter()
            .map(|id| KarmaEvent::QuestionAsked {
                question_id: id.clone(),
            })
            .chain(answer_ids.iter().map(|id| KarmaEvent::AnswerPosted {
                answer_id: id.clone(),
            }))
            .chain(accepted_ids.iter().map(|id| KarmaEvent::AnswerAccepted {
                answer_id: id.clone(),
            }));
        let mut rewards_restored = 0;
        let mut badges_restored = false;
        for event in events {
            let award = KarmaAccount::reward_in(txn, self.id_gen, self.user_id, &event).await?;
            if award.awarded {
                tracing::warn!(
                    user_id = %self.user_id,
                    event_key = %event.event_key(),
                    "Restored missing karma award"
                );
                rewards_restored += 1;
            }
            badges_restored |= award.badge_unlocked.is_some();
        }

        let user = UserRepository::get_by_id(txn, self.user_id).await?;
        let followers = FollowRepository::count_followers(txn, self.user_id).await?;
        let following = FollowRepository::count_following(txn, self.user_id).await?;
        let karma = KarmaRepository::total_for_user(txn, self.user_id).await?;

        let counts = UserCounts {
            user_id: user.id.clone(),
            karma: karma.clamp(0, i64::from(i32::MAX)) as i32,
            questions_count: question_ids.len() as i32,
            answers_count: answer_ids.len() as i32,
            accepted_answers: accepted_ids.len() as i32,
            follower_count: to_count(followers),
            following_count: to_count(following),
            rewards_restored,
            repaired: false,
        };
        let repaired = rewards_restored > 0
            || badges_restored
            || user.karma != counts.karma
            || user.questions_count != counts.questions_count
            || user.answers_count != counts.answers_count
            || user.accepted_answers != counts.accepted_answers
            || user.follower_count != counts.follower_count
            || user.following_count != counts.following_count
            || user.question_id_list() != question_ids
            || user.answer_id_list() != answer_ids;

        if repaired {
            let mut active: user::ActiveModel = user.into();
            active.karma = Set(counts.karma);
            active.questions_count = Set(counts.questions_count);
            active.answers_count = Set(counts.answers_count);
            active.accepted_answers = Set(counts.accepted_answers);
            active.follower_count = Set(counts.follower_count);
            active.following_count = Set(counts.following_count);
            active.question_ids = Set(user::json_list(question_ids));
            active.answer_ids = Set(user::json_list(answer_ids));
            active.updated_at = Set(Some(Utc::now().into()));
            UserRepository::update(txn, active).await?;
        }

        Ok(UserCounts { repaired, ..counts })
    }
}

struct RecountQuestion<'a> {
    question_id: &'a str,
}

#[async_trait]
impl<'a> UnitOfWork for RecountQuestion<'a> {
    type Output = QuestionCounts;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<QuestionCounts> {
        let question = QuestionRepository::get_by_id(txn, self.question_id).await?;

        let (up, down) = VoteRepository::tally(txn, &question.id).await?;
        QuestionRepository::set_votes(txn, &question.id, to_count(up), to_count(down)).await?;

        let answers = AnswerRepository::find_by_question(txn, &question.id).await?;
        for answer in &answers {
            let (answer_up, answer_down) = VoteRepository::tally(txn, &answer.id).await?;
            AnswerRepository::set_votes(
                txn,
                &answer.id,
                to_count(answer_up),
                to_count(answer_down),
            )
            .await?;
        }
        let answer_count = answers.len() as i32;
        QuestionRepository::set_answer_count(txn, &question.id, answer_count).await?;

        // Keep the answer the question points at when it is flagged, else
        // the oldest flagged one.
        let mut accepted: Vec<_> = answers.iter().filter(|a| a.is_accepted).collect();
        accepted.sort_by(|a, b| a.id.cmp(&b.id));
        let keep = accepted
            .iter()
            .find(|a| question.accepted_answer_id.as_deref() == Some(a.id.as_str()))
            .or_else(|| accepted.first())
            .map(|a| a.id.clone());
        for extra in accepted.iter().filter(|a| Some(&a.id) != keep.as_ref()) {
            tracing::warn!(
                question_id = %question.id,
                answer_id = %extra.id,
                "Clearing extra accepted answer"
            );
            AnswerRepository::set_accepted(txn, &extra.id, false).await?;
        }
        if question.accepted_answer_id != keep {
            QuestionRepository::set_accepted_answer(
                txn,
                &question.id,
                keep.as_deref(),
                Utc::now().into(),
            )
            .await?;
        }

        Ok(QuestionCounts {
            question_id: question.id,
            upvotes: to_count(up),
            downvotes: to_count(down),
            answer_count,
            accepted_answer_id: keep,
        })
    }
}

struct RecountTags;

#[async_trait]
impl UnitOfWork for RecountTags {
    type Output = usize;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<usize> {
        let tags = TagRepository::all(txn).await?;
        for tag in &tags {
            let links = to_count(TagRepository::count_links(txn, &tag.name).await?);
            if links != tag.question_count {
                tracing::info!(
                    tag = %tag.name,
                    stored = tag.question_count,
                    actual = links,
                    "Repaired tag count"
                );
                TagRepository::set_count(txn, &tag.name, links).await?;
            }
        }
        Ok(tags.len())
    }
}
