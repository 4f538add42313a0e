//! Ledger scenarios against an in-memory SQLite database.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, Set};
use stackit_common::AppError;
use stackit_core::{
    AcceptanceService, AccountService, AdminService, AnswerInput, AnswerService,
    AskQuestionInput, ContentCounters, FollowService, KarmaService, NotificationService,
    QuestionService, Session, SignUpInput, UpdateQuestionInput, VoteService,
    karma::{FIRST_ACCEPTED_ANSWER_BADGE, FIRST_CONTRIBUTION_BADGE},
};
use stackit_db::{
    RetryPolicy,
    entities::{
        Answer, KarmaHistory, Vote, karma_history,
        user::{self, Role},
        vote::{self, TargetType, VoteType},
        answer,
    },
    repositories::{QuestionRepository, TagRepository, UserCounter, UserRepository, VoteRepository},
    test_utils::setup_sqlite,
};

struct Ledger {
    db: Arc<DatabaseConnection>,
    accounts: AccountService,
    questions: QuestionService,
    answers: AnswerService,
    acceptance: AcceptanceService,
    votes: VoteService,
    follows: FollowService,
    notifications: NotificationService,
    counters: ContentCounters,
}

impl Ledger {
    async fn new() -> Self {
        let db = Arc::new(setup_sqlite().await.expect("in-memory database"));
        let policy = RetryPolicy::default();
        let karma = KarmaService::new(db.clone(), policy);
        let notifications = NotificationService::new(db.clone());
        Self {
            accounts: AccountService::new(db.clone(), policy),
            questions: QuestionService::new(db.clone(), policy, karma.clone()),
            answers: AnswerService::new(db.clone(), policy, karma, notifications.clone()),
            acceptance: AcceptanceService::new(db.clone(), policy, notifications.clone()),
            votes: VoteService::new(db.clone(), policy),
            follows: FollowService::new(db.clone(), policy, notifications.clone()),
            counters: ContentCounters::new(db.clone(), policy),
            notifications,
            db,
        }
    }

    async fn user(&self, username: &str) -> Session {
        let signed_in = self
            .accounts
            .sign_up(SignUpInput {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password: "password123".to_string(),
            })
            .await
            .unwrap();
        Session::from_user(&signed_in.user)
    }

    async fn ask(&self, session: &Session, title: &str, tags: &[&str]) -> String {
        self.questions
            .ask(
                session,
                AskQuestionInput {
                    title: title.to_string(),
                    description: "<p>Details</p>".to_string(),
                    tags: tags.iter().map(ToString::to_string).collect(),
                    is_anonymous: false,
                },
            )
            .await
            .unwrap()
            .question
            .id
    }

    async fn answer(&self, session: &Session, question_id: &str) -> String {
        self.answers
            .post(
                session,
                question_id,
                AnswerInput {
                    content: "Use a scoped thread.".to_string(),
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn karma(&self, session: &Session) -> i32 {
        UserRepository::get_by_id(self.db.as_ref(), &session.user_id)
            .await
            .unwrap()
            .karma
    }

    async fn vote_rows(&self, user_id: &str, target_id: &str) -> u64 {
        Vote::find()
            .filter(vote::Column::UserId.eq(user_id))
            .filter(vote::Column::TargetId.eq(target_id))
            .count(self.db.as_ref())
            .await
            .unwrap()
    }

    async fn accepted_answers(&self, question_id: &str) -> u64 {
        Answer::find()
            .filter(answer::Column::QuestionId.eq(question_id))
            .filter(answer::Column::IsAccepted.eq(true))
            .count(self.db.as_ref())
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn ask_answer_accept_pays_karma_and_badges() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;

    let question_id = ledger.ask(&alice, "How do I share state?", &["rust"]).await;
    assert_eq!(ledger.karma(&alice).await, 5);

    let answer_id = ledger.answer(&bob, &question_id).await;
    assert_eq!(ledger.karma(&bob).await, 10);

    let outcome = ledger
        .acceptance
        .accept_answer(&alice, &question_id, &answer_id)
        .await
        .unwrap();
    assert!(outcome.changed);
    assert!(outcome.karma_awarded);
    assert_eq!(ledger.karma(&bob).await, 35);

    let bob_row = UserRepository::get_by_id(ledger.db.as_ref(), &bob.user_id)
        .await
        .unwrap();
    assert!(bob_row.has_badge(FIRST_CONTRIBUTION_BADGE));
    assert!(bob_row.has_badge(FIRST_ACCEPTED_ANSWER_BADGE));
    assert_eq!(bob_row.accepted_answers, 1);
    assert_eq!(bob_row.answers_count, 1);

    let question = QuestionRepository::get_by_id(ledger.db.as_ref(), &question_id)
        .await
        .unwrap();
    assert!(question.is_answered);
    assert_eq!(question.accepted_answer_id.as_deref(), Some(answer_id.as_str()));
    assert_eq!(question.answer_count, 1);

    // The asker hears about the answer, the answerer about the acceptance.
    assert_eq!(ledger.notifications.unread_count(&alice).await.unwrap(), 1);
    assert_eq!(ledger.notifications.unread_count(&bob).await.unwrap(), 1);
}

#[tokio::test]
async fn accepting_twice_pays_once() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let question_id = ledger.ask(&alice, "Lifetimes?", &["rust"]).await;
    let answer_id = ledger.answer(&bob, &question_id).await;

    ledger
        .acceptance
        .accept_answer(&alice, &question_id, &answer_id)
        .await
        .unwrap();
    let again = ledger
        .acceptance
        .accept_answer(&alice, &question_id, &answer_id)
        .await
        .unwrap();

    assert!(!again.changed);
    assert!(!again.karma_awarded);
    assert_eq!(ledger.karma(&bob).await, 35);
}

#[tokio::test]
async fn reassigning_acceptance_keeps_one_accepted_answer() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let carol = ledger.user("carol").await;
    let question_id = ledger.ask(&alice, "Pinning?", &["async"]).await;
    let first = ledger.answer(&bob, &question_id).await;
    let second = ledger.answer(&carol, &question_id).await;

    ledger
        .acceptance
        .accept_answer(&alice, &question_id, &first)
        .await
        .unwrap();
    let outcome = ledger
        .acceptance
        .accept_answer(&alice, &question_id, &second)
        .await
        .unwrap();

    assert_eq!(outcome.previous_answer_id.as_deref(), Some(first.as_str()));
    assert_eq!(ledger.accepted_answers(&question_id).await, 1);

    let question = QuestionRepository::get_by_id(ledger.db.as_ref(), &question_id)
        .await
        .unwrap();
    assert_eq!(question.accepted_answer_id.as_deref(), Some(second.as_str()));

    // No clawback for the earlier acceptance.
    assert_eq!(ledger.karma(&bob).await, 35);
    assert_eq!(ledger.karma(&carol).await, 35);

    let bob_row = UserRepository::get_by_id(ledger.db.as_ref(), &bob.user_id)
        .await
        .unwrap();
    assert_eq!(bob_row.accepted_answers, 0);
}

#[tokio::test]
async fn non_author_cannot_accept() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let eve = ledger.user("eve").await;
    let question_id = ledger.ask(&alice, "Traits?", &["rust"]).await;
    let answer_id = ledger.answer(&bob, &question_id).await;

    let err = ledger
        .acceptance
        .accept_answer(&eve, &question_id, &answer_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let question = QuestionRepository::get_by_id(ledger.db.as_ref(), &question_id)
        .await
        .unwrap();
    assert!(!question.is_answered);
    assert_eq!(ledger.accepted_answers(&question_id).await, 0);
    assert_eq!(ledger.karma(&bob).await, 10);
}

#[tokio::test]
async fn answer_from_another_question_is_rejected() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let first = ledger.ask(&alice, "First", &["rust"]).await;
    let second = ledger.ask(&alice, "Second", &["rust"]).await;
    let answer_id = ledger.answer(&bob, &second).await;

    let err = ledger
        .acceptance
        .accept_answer(&alice, &first, &answer_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
}

#[tokio::test]
async fn upvoting_twice_withdraws_the_vote() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let carol = ledger.user("carol").await;
    let question_id = ledger.ask(&alice, "Send vs Sync?", &["rust"]).await;

    let first = ledger
        .votes
        .cast_vote(&carol, &question_id, TargetType::Question, VoteType::Up)
        .await
        .unwrap();
    assert_eq!(first.score, 1);
    assert_eq!(first.vote, Some(VoteType::Up));
    assert_eq!(ledger.vote_rows(&carol.user_id, &question_id).await, 1);

    let second = ledger
        .votes
        .cast_vote(&carol, &question_id, TargetType::Question, VoteType::Up)
        .await
        .unwrap();
    assert_eq!(second.score, 0);
    assert_eq!(second.vote, None);
    assert_eq!(ledger.vote_rows(&carol.user_id, &question_id).await, 0);
}

#[tokio::test]
async fn flipping_a_downvote_moves_score_by_two() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let dave = ledger.user("dave").await;
    let question_id = ledger.ask(&alice, "Box<dyn Error>?", &["rust"]).await;
    let answer_id = ledger.answer(&bob, &question_id).await;

    let down = ledger
        .votes
        .cast_vote(&dave, &answer_id, TargetType::Answer, VoteType::Down)
        .await
        .unwrap();
    assert_eq!(down.score, -1);

    let up = ledger
        .votes
        .cast_vote(&dave, &answer_id, TargetType::Answer, VoteType::Up)
        .await
        .unwrap();
    assert_eq!(up.score, 1);
    assert_eq!((up.upvotes, up.downvotes), (1, 0));
    assert_eq!(up.score - down.score, 2);
    assert_eq!(up.question_id, question_id);
    assert_eq!(ledger.vote_rows(&dave.user_id, &answer_id).await, 1);

    let votes = ledger
        .votes
        .user_votes(&dave.user_id, &[answer_id.clone(), question_id.clone()])
        .await
        .unwrap();
    assert_eq!(votes[&answer_id], Some(VoteType::Up));
    assert_eq!(votes[&question_id], None);
}

#[tokio::test]
async fn any_vote_sequence_leaves_at_most_one_row() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let carol = ledger.user("carol").await;
    let question_id = ledger.ask(&alice, "Iterators?", &["rust"]).await;

    let sequence = [
        VoteType::Up,
        VoteType::Down,
        VoteType::Down,
        VoteType::Up,
        VoteType::Up,
        VoteType::Down,
    ];
    for vote_type in sequence {
        let outcome = ledger
            .votes
            .cast_vote(&carol, &question_id, TargetType::Question, vote_type)
            .await
            .unwrap();
        let rows = ledger.vote_rows(&carol.user_id, &question_id).await;
        assert!(rows <= 1);
        assert_eq!(rows, u64::from(outcome.vote.is_some()));
        assert_eq!(outcome.score, outcome.upvotes - outcome.downvotes);
    }
}

#[tokio::test]
async fn voting_on_missing_target_is_not_found() {
    let ledger = Ledger::new().await;
    let carol = ledger.user("carol").await;

    let err = ledger
        .votes
        .cast_vote(&carol, "missing", TargetType::Answer, VoteType::Up)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AnswerNotFound(_)));
}

#[tokio::test]
async fn banned_users_cannot_write() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let question_id = ledger.ask(&alice, "Macros?", &["rust"]).await;

    let mut banned = ledger.user("mallory").await;
    banned.is_banned = true;

    let err = ledger
        .votes
        .cast_vote(&banned, &question_id, TargetType::Question, VoteType::Down)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn recount_repairs_drifted_counters() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    ledger.ask(&alice, "One", &["rust"]).await;
    ledger.ask(&alice, "Two", &["rust"]).await;

    UserRepository::adjust_counter(ledger.db.as_ref(), &alice.user_id, UserCounter::QuestionsCount, 3)
        .await
        .unwrap();
    UserRepository::adjust_counter(ledger.db.as_ref(), &alice.user_id, UserCounter::Karma, 100)
        .await
        .unwrap();

    let counts = ledger.counters.recount_user(&alice.user_id).await.unwrap();
    assert!(counts.repaired);
    assert_eq!(counts.questions_count, 2);
    assert_eq!(counts.karma, 10);

    let again = ledger.counters.recount_user(&alice.user_id).await.unwrap();
    assert!(!again.repaired);
}

/// Leave a user as a failed after-commit award would: no history rows,
/// no karma, no badges.
async fn lose_rewards(ledger: &Ledger, user_id: &str) {
    KarmaHistory::delete_many()
        .filter(karma_history::Column::UserId.eq(user_id))
        .exec(ledger.db.as_ref())
        .await
        .unwrap();
    let row = UserRepository::get_by_id(ledger.db.as_ref(), user_id)
        .await
        .unwrap();
    let mut active: user::ActiveModel = row.into();
    active.karma = Set(0);
    active.badges = Set(user::json_list(Vec::<String>::new()));
    UserRepository::update(ledger.db.as_ref(), active)
        .await
        .unwrap();
}

#[tokio::test]
async fn recount_restores_lost_awards_and_badges() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let question_id = ledger.ask(&alice, "Where did my karma go?", &["rust"]).await;
    let answer_id = ledger.answer(&bob, &question_id).await;
    ledger
        .acceptance
        .accept_answer(&alice, &question_id, &answer_id)
        .await
        .unwrap();

    lose_rewards(&ledger, &alice.user_id).await;
    lose_rewards(&ledger, &bob.user_id).await;

    let alice_counts = ledger.counters.recount_user(&alice.user_id).await.unwrap();
    assert!(alice_counts.repaired);
    assert_eq!(alice_counts.rewards_restored, 1);
    assert_eq!(alice_counts.questions_count, 1);
    assert_eq!(alice_counts.karma, 5);

    let bob_counts = ledger.counters.recount_user(&bob.user_id).await.unwrap();
    assert_eq!(bob_counts.rewards_restored, 2);
    assert_eq!(bob_counts.karma, 35);
    assert_eq!(bob_counts.accepted_answers, 1);

    let alice_row = UserRepository::get_by_id(ledger.db.as_ref(), &alice.user_id)
        .await
        .unwrap();
    assert_eq!(alice_row.karma, 5);
    assert!(alice_row.has_badge(FIRST_CONTRIBUTION_BADGE));
    assert!(!alice_row.has_badge(FIRST_ACCEPTED_ANSWER_BADGE));

    let bob_row = UserRepository::get_by_id(ledger.db.as_ref(), &bob.user_id)
        .await
        .unwrap();
    assert_eq!(bob_row.karma, 35);
    assert!(bob_row.has_badge(FIRST_CONTRIBUTION_BADGE));
    assert!(bob_row.has_badge(FIRST_ACCEPTED_ANSWER_BADGE));

    // A second pass finds nothing left to pay.
    let again = ledger.counters.recount_user(&bob.user_id).await.unwrap();
    assert!(!again.repaired);
    assert_eq!(again.rewards_restored, 0);
    assert_eq!(again.karma, 35);
}

#[tokio::test]
async fn recount_restores_a_missing_badge_alone() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    ledger.ask(&alice, "Badges?", &["rust"]).await;

    let row = UserRepository::get_by_id(ledger.db.as_ref(), &alice.user_id)
        .await
        .unwrap();
    let mut active: user::ActiveModel = row.into();
    active.badges = Set(user::json_list(Vec::<String>::new()));
    UserRepository::update(ledger.db.as_ref(), active)
        .await
        .unwrap();

    let counts = ledger.counters.recount_user(&alice.user_id).await.unwrap();
    assert!(counts.repaired);
    assert_eq!(counts.rewards_restored, 0);
    assert_eq!(counts.karma, 5);
    let row = UserRepository::get_by_id(ledger.db.as_ref(), &alice.user_id)
        .await
        .unwrap();
    assert!(row.has_badge(FIRST_CONTRIBUTION_BADGE));
}

#[tokio::test]
async fn concurrent_identical_votes_serialize() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let carol = ledger.user("carol").await;
    let question_id = ledger.ask(&alice, "Races?", &["rust"]).await;

    let (first, second) = tokio::join!(
        ledger
            .votes
            .cast_vote(&carol, &question_id, TargetType::Question, VoteType::Up),
        ledger
            .votes
            .cast_vote(&carol, &question_id, TargetType::Question, VoteType::Up),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    // One vote landed and the other toggled it off, in some order.
    let mut results = [first.vote, second.vote];
    results.sort_by_key(Option::is_some);
    assert_eq!(results, [None, Some(VoteType::Up)]);

    assert!(ledger.vote_rows(&carol.user_id, &question_id).await <= 1);
    let question = QuestionRepository::get_by_id(ledger.db.as_ref(), &question_id)
        .await
        .unwrap();
    let (up, down) = VoteRepository::tally(ledger.db.as_ref(), &question_id)
        .await
        .unwrap();
    assert_eq!(
        (i64::from(question.upvotes), i64::from(question.downvotes)),
        (up as i64, down as i64)
    );
    assert_eq!((question.upvotes, question.downvotes), (0, 0));
}

#[tokio::test]
async fn concurrent_opposite_votes_keep_counters_in_step() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let carol = ledger.user("carol").await;
    let dave = ledger.user("dave").await;
    let question_id = ledger.ask(&alice, "Atomics?", &["rust"]).await;
    let answer_id = ledger.answer(&bob, &question_id).await;

    let (up, down, other) = tokio::join!(
        ledger
            .votes
            .cast_vote(&carol, &answer_id, TargetType::Answer, VoteType::Up),
        ledger
            .votes
            .cast_vote(&carol, &answer_id, TargetType::Answer, VoteType::Down),
        ledger
            .votes
            .cast_vote(&dave, &answer_id, TargetType::Answer, VoteType::Up),
    );
    up.unwrap();
    down.unwrap();
    other.unwrap();

    // Carol's second click flipped her first one.
    assert_eq!(ledger.vote_rows(&carol.user_id, &answer_id).await, 1);
    assert_eq!(ledger.vote_rows(&dave.user_id, &answer_id).await, 1);

    let answer = Answer::find_by_id(answer_id.clone())
        .one(ledger.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let (tally_up, tally_down) = VoteRepository::tally(ledger.db.as_ref(), &answer_id)
        .await
        .unwrap();
    assert_eq!(answer.upvotes as u64, tally_up);
    assert_eq!(answer.downvotes as u64, tally_down);
    assert_eq!(tally_up + tally_down, 2);
}

#[tokio::test]
async fn concurrent_acceptances_leave_one_accepted_answer() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let carol = ledger.user("carol").await;
    let question_id = ledger.ask(&alice, "Which runtime?", &["async"]).await;
    let bob_answer = ledger.answer(&bob, &question_id).await;
    let carol_answer = ledger.answer(&carol, &question_id).await;

    let (first, second) = tokio::join!(
        ledger
            .acceptance
            .accept_answer(&alice, &question_id, &bob_answer),
        ledger
            .acceptance
            .accept_answer(&alice, &question_id, &carol_answer),
    );
    first.unwrap();
    second.unwrap();

    assert_eq!(ledger.accepted_answers(&question_id).await, 1);

    let question = QuestionRepository::get_by_id(ledger.db.as_ref(), &question_id)
        .await
        .unwrap();
    assert!(question.is_answered);
    let accepted = question.accepted_answer_id.unwrap();
    assert!(accepted == bob_answer || accepted == carol_answer);

    let accepted_row = Answer::find_by_id(accepted.clone())
        .one(ledger.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(accepted_row.is_accepted);

    let bob_row = UserRepository::get_by_id(ledger.db.as_ref(), &bob.user_id)
        .await
        .unwrap();
    let carol_row = UserRepository::get_by_id(ledger.db.as_ref(), &carol.user_id)
        .await
        .unwrap();
    assert_eq!(bob_row.accepted_answers + carol_row.accepted_answers, 1);
}

#[tokio::test]
async fn deleting_a_question_releases_tags_and_counters() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let doomed = ledger.ask(&alice, "Doomed", &["rust", "async"]).await;
    ledger.ask(&alice, "Kept", &["Rust"]).await;
    let answer_id = ledger.answer(&bob, &doomed).await;
    ledger
        .votes
        .cast_vote(&bob, &doomed, TargetType::Question, VoteType::Up)
        .await
        .unwrap();
    ledger
        .acceptance
        .accept_answer(&alice, &doomed, &answer_id)
        .await
        .unwrap();

    let deleted = ledger.questions.delete(&alice, &doomed).await.unwrap();
    assert_eq!(deleted.answers_removed, 1);
    assert_eq!(deleted.votes_removed, 1);

    let rust = TagRepository::find_by_name(ledger.db.as_ref(), "rust")
        .await
        .unwrap()
        .unwrap();
    let async_tag = TagRepository::find_by_name(ledger.db.as_ref(), "async")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rust.question_count, 1);
    assert_eq!(async_tag.question_count, 0);

    let alice_row = UserRepository::get_by_id(ledger.db.as_ref(), &alice.user_id)
        .await
        .unwrap();
    let bob_row = UserRepository::get_by_id(ledger.db.as_ref(), &bob.user_id)
        .await
        .unwrap();
    assert_eq!(alice_row.questions_count, 1);
    assert_eq!(alice_row.question_id_list().len(), 1);
    assert_eq!(bob_row.answers_count, 0);
    assert_eq!(bob_row.accepted_answers, 0);
    // Karma already paid stays.
    assert_eq!(bob_row.karma, 35);
}

#[tokio::test]
async fn retagging_moves_tag_counts() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let question_id = ledger.ask(&alice, "Tagged", &["rust", "serde"]).await;

    let detail = ledger
        .questions
        .update(
            &alice,
            &question_id,
            UpdateQuestionInput {
                tags: Some(vec!["rust".to_string(), "json".to_string()]),
                ..UpdateQuestionInput::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(detail.tags, vec!["rust".to_string(), "json".to_string()]);

    let count = |name: &'static str| {
        let db = ledger.db.clone();
        async move {
            TagRepository::find_by_name(db.as_ref(), name)
                .await
                .unwrap()
                .map_or(0, |t| t.question_count)
        }
    };
    assert_eq!(count("rust").await, 1);
    assert_eq!(count("serde").await, 0);
    assert_eq!(count("json").await, 1);
}

#[tokio::test]
async fn deleting_the_accepted_answer_reopens_the_question() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let question_id = ledger.ask(&alice, "Reopen?", &["rust"]).await;
    let answer_id = ledger.answer(&bob, &question_id).await;
    ledger
        .acceptance
        .accept_answer(&alice, &question_id, &answer_id)
        .await
        .unwrap();

    ledger.answers.delete(&bob, &answer_id).await.unwrap();

    let question = QuestionRepository::get_by_id(ledger.db.as_ref(), &question_id)
        .await
        .unwrap();
    assert!(!question.is_answered);
    assert_eq!(question.accepted_answer_id, None);
    assert_eq!(question.answer_count, 0);
}

#[tokio::test]
async fn follows_are_unique() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;

    assert!(ledger.follows.follow_user(&alice, &bob.user_id).await.unwrap());
    assert!(!ledger.follows.follow_user(&alice, &bob.user_id).await.unwrap());
    assert!(
        ledger
            .follows
            .is_following(&alice.user_id, &bob.user_id)
            .await
            .unwrap()
    );

    let bob_row = UserRepository::get_by_id(ledger.db.as_ref(), &bob.user_id)
        .await
        .unwrap();
    assert_eq!(bob_row.follower_count, 1);
    assert_eq!(ledger.follows.followers(&bob.user_id).await.unwrap().len(), 1);
    assert_eq!(ledger.notifications.unread_count(&bob).await.unwrap(), 1);

    assert!(ledger.follows.unfollow_user(&alice, &bob.user_id).await.unwrap());
    assert!(!ledger.follows.unfollow_user(&alice, &bob.user_id).await.unwrap());
    let alice_row = UserRepository::get_by_id(ledger.db.as_ref(), &alice.user_id)
        .await
        .unwrap();
    assert_eq!(alice_row.following_count, 0);

    assert!(matches!(
        ledger.follows.follow_user(&alice, &alice.user_id).await,
        Err(AppError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn admin_recount_all_is_clean_after_normal_flow() {
    let ledger = Ledger::new().await;
    let alice = ledger.user("alice").await;
    let bob = ledger.user("bob").await;
    let question_id = ledger.ask(&alice, "Clean?", &["rust"]).await;
    let answer_id = ledger.answer(&bob, &question_id).await;
    ledger
        .acceptance
        .accept_answer(&alice, &question_id, &answer_id)
        .await
        .unwrap();
    ledger.follows.follow_user(&bob, &alice.user_id).await.unwrap();

    let admin = AdminService::new(ledger.db.clone(), ledger.counters.clone());
    assert!(matches!(
        admin.recount_all(&alice).await,
        Err(AppError::Forbidden(_))
    ));

    let root = Session {
        role: Role::Admin,
        ..alice.clone()
    };
    let summary = admin.recount_all(&root).await.unwrap();
    assert_eq!(summary.questions, 1);
    assert_eq!(summary.users, 2);
    assert_eq!(summary.users_repaired, 0);
}

#[tokio::test]
async fn sign_in_and_out() {
    let ledger = Ledger::new().await;
    let signed_up = ledger
        .accounts
        .sign_up(SignUpInput {
            username: "Alice".to_string(),
            email: "Alice@Example.com".to_string(),
            password: "password123".to_string(),
        })
        .await
        .unwrap();

    let duplicate = ledger
        .accounts
        .sign_up(SignUpInput {
            username: "alice".to_string(),
            email: "other@example.com".to_string(),
            password: "password123".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(duplicate, AppError::InvalidArgument(_)));

    let signed_in = ledger
        .accounts
        .sign_in(stackit_core::SignInInput {
            login: "alice@example.com".to_string(),
            password: "password123".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(signed_in.token, signed_up.token);

    let session = ledger.accounts.authenticate(&signed_in.token).await.unwrap();
    assert_eq!(session.username, "Alice");

    ledger.accounts.sign_out(&signed_in.token).await.unwrap();
    assert!(matches!(
        ledger.accounts.authenticate(&signed_in.token).await,
        Err(AppError::Unauthorized)
    ));

    let wrong = ledger
        .accounts
        .sign_in(stackit_core::SignInInput {
            login: "alice".to_string(),
            password: "wrong-password".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(wrong, AppError::Unauthorized));
}
