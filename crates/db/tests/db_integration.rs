//! Repository tests against a migrated in-memory SQLite database.
//!
//! Run with: `cargo test -p stackit-db --features test-utils`

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, FixedOffset, Utc};
use maplit::hashset;
use sea_orm::{DatabaseConnection, Set};
use stackit_db::entities::{karma_history, question, tag, user, vote};
use stackit_db::repositories::{
    KarmaRepository, QuestionRepository, TagRepository, UserCounter, UserRepository,
    VoteRepository,
};
use stackit_db::test_utils::setup_sqlite;
use std::collections::HashSet;

fn now() -> DateTime<FixedOffset> {
    Utc::now().fixed_offset()
}

async fn insert_user(db: &DatabaseConnection, id: &str, username: &str) -> user::Model {
    let model = user::ActiveModel {
        id: Set(id.to_string()),
        username: Set(username.to_string()),
        username_lower: Set(username.to_lowercase()),
        email: Set(format!("{}@example.com", username.to_lowercase())),
        token: Set(None),
        password_hash: Set("$argon2id$placeholder".to_string()),
        avatar_url: Set(None),
        bio: Set(None),
        role: Set(user::Role::User),
        karma: Set(0),
        badges: Set(serde_json::json!([])),
        is_banned: Set(false),
        follower_count: Set(0),
        following_count: Set(0),
        questions_count: Set(0),
        answers_count: Set(0),
        accepted_answers: Set(0),
        question_ids: Set(serde_json::json!([])),
        answer_ids: Set(serde_json::json!([])),
        created_at: Set(now()),
        updated_at: Set(None),
    };
    UserRepository::create(db, model).await.unwrap()
}

async fn insert_question(db: &DatabaseConnection, id: &str, author_id: &str) -> question::Model {
    let model = question::ActiveModel {
        id: Set(id.to_string()),
        title: Set("How do lifetimes work?".to_string()),
        description: Set("<p>Borrow checker question</p>".to_string()),
        author_id: Set(author_id.to_string()),
        is_anonymous: Set(false),
        upvotes: Set(0),
        downvotes: Set(0),
        views: Set(0),
        answer_count: Set(0),
        is_answered: Set(false),
        accepted_answer_id: Set(None),
        created_at: Set(now()),
        updated_at: Set(None),
    };
    QuestionRepository::create(db, model).await.unwrap()
}

fn up_vote(id: &str, user_id: &str, target_id: &str) -> vote::ActiveModel {
    vote::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set(user_id.to_string()),
        target_id: Set(target_id.to_string()),
        target_type: Set(vote::TargetType::Question),
        vote_type: Set(vote::VoteType::Up),
        created_at: Set(now()),
        updated_at: Set(None),
    }
}

#[tokio::test]
async fn test_second_vote_on_same_target_is_conflict() {
    let db = setup_sqlite().await.unwrap();
    insert_user(&db, "u1", "alice").await;
    insert_question(&db, "q1", "u1").await;

    VoteRepository::create(&db, up_vote("v1", "u1", "q1"))
        .await
        .unwrap();
    let err = VoteRepository::create(&db, up_vote("v2", "u1", "q1"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let (up, down) = VoteRepository::tally(&db, "q1").await.unwrap();
    assert_eq!((up, down), (1, 0));
}

#[tokio::test]
async fn test_vote_direction_change_updates_tally() {
    let db = setup_sqlite().await.unwrap();
    insert_user(&db, "u1", "alice").await;
    insert_question(&db, "q1", "u1").await;

    let vote = VoteRepository::create(&db, up_vote("v1", "u1", "q1"))
        .await
        .unwrap();
    VoteRepository::set_type(&db, &vote.id, vote::VoteType::Down, now())
        .await
        .unwrap();

    let (up, down) = VoteRepository::tally(&db, "q1").await.unwrap();
    assert_eq!((up, down), (0, 1));
    let found = VoteRepository::find(&db, "u1", "q1").await.unwrap().unwrap();
    assert_eq!(found.vote_type, vote::VoteType::Down);
    assert!(found.updated_at.is_some());
}

#[tokio::test]
async fn test_tag_count_never_goes_negative() {
    let db = setup_sqlite().await.unwrap();

    TagRepository::upsert_increment(&db, "t1".into(), "rust", now())
        .await
        .unwrap();
    TagRepository::upsert_increment(&db, "t2".into(), "rust", now())
        .await
        .unwrap();
    let tag: tag::Model = TagRepository::find_by_name(&db, "rust")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tag.question_count, 2);

    for _ in 0..3 {
        TagRepository::decrement(&db, "rust").await.unwrap();
    }
    let tag = TagRepository::find_by_name(&db, "rust")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tag.question_count, 0);
}

#[tokio::test]
async fn test_tag_links_keep_order() {
    let db = setup_sqlite().await.unwrap();
    insert_user(&db, "u1", "alice").await;
    insert_question(&db, "q1", "u1").await;

    let links = vec![
        ("l1".to_string(), "rust".to_string()),
        ("l2".to_string(), "axum".to_string()),
        ("l3".to_string(), "tokio".to_string()),
    ];
    TagRepository::link(&db, "q1", &links).await.unwrap();

    let names = TagRepository::names_for_question(&db, "q1").await.unwrap();
    assert_eq!(names, vec!["rust", "axum", "tokio"]);

    TagRepository::unlink_all(&db, "q1").await.unwrap();
    assert!(
        TagRepository::names_for_question(&db, "q1")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_karma_event_recorded_once() {
    let db = setup_sqlite().await.unwrap();
    insert_user(&db, "u1", "alice").await;

    let entry = |id: &str, key: &str, points: i32| karma_history::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set("u1".to_string()),
        points: Set(points),
        reason: Set("answer accepted".to_string()),
        event_key: Set(key.to_string()),
        created_at: Set(now()),
    };

    KarmaRepository::create(&db, entry("k1", "answer:a1:accepted", 15))
        .await
        .unwrap();
    KarmaRepository::create(&db, entry("k2", "question:q1:up:u2", 5))
        .await
        .unwrap();
    let err = KarmaRepository::create(&db, entry("k3", "answer:a1:accepted", 15))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    assert_eq!(KarmaRepository::total_for_user(&db, "u1").await.unwrap(), 20);
    assert!(
        KarmaRepository::find_by_event_key(&db, "answer:a1:accepted")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_karma_total_without_history_is_zero() {
    let db = setup_sqlite().await.unwrap();
    insert_user(&db, "u1", "alice").await;

    assert_eq!(KarmaRepository::total_for_user(&db, "u1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_user_counter_decrement_floors_at_zero() {
    let db = setup_sqlite().await.unwrap();
    insert_user(&db, "u1", "alice").await;

    UserRepository::adjust_counter(&db, "u1", UserCounter::FollowerCount, 1)
        .await
        .unwrap();
    UserRepository::adjust_counter(&db, "u1", UserCounter::FollowerCount, -1)
        .await
        .unwrap();
    UserRepository::adjust_counter(&db, "u1", UserCounter::FollowerCount, -1)
        .await
        .unwrap();

    let user = UserRepository::get_by_id(&db, "u1").await.unwrap();
    assert_eq!(user.follower_count, 0);
}

#[tokio::test]
async fn test_unique_username_and_lookup() {
    let db = setup_sqlite().await.unwrap();
    insert_user(&db, "u1", "Alice").await;

    let found = UserRepository::find_by_username(&db, "alice").await.unwrap();
    assert_eq!(found.map(|u| u.id), Some("u1".to_string()));

    let ids: HashSet<String> = UserRepository::all_ids(&db).await.unwrap().into_iter().collect();
    assert_eq!(ids, hashset! {"u1".to_string()});
}
