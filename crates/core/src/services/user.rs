//! User service: profiles, stats and the karma leaderboard.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use stackit_common::{AppError, AppResult};
use stackit_db::{
    entities::{answer, question, user},
    repositories::{AnswerRepository, QuestionRepository, UserRepository},
};
use validator::Validate;

use crate::session::Session;

/// Leaderboard size.
pub const LEADERBOARD_SIZE: u64 = 100;

/// Input for editing one's own profile.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    #[validate(url)]
    pub avatar_url: Option<String>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
}

/// Live activity numbers for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub user_id: String,
    pub karma: i32,
    pub badges: Vec<String>,
    /// Counted from the questions table, not the stored counter.
    pub questions: u64,
    /// Counted from the answers table, not the stored counter.
    pub answers: u64,
    pub accepted_answers: u64,
    pub followers: i32,
    pub following: i32,
}

/// An answer with the title of the question it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerWithQuestion {
    #[serde(flatten)]
    pub answer: answer::Model,
    pub question_title: Option<String>,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u64,
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub karma: i32,
    pub badges: Vec<String>,
}

/// The leaderboard plus the viewer's position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub total_participants: u64,
    pub viewer_rank: Option<u64>,
}

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    user_repo: UserRepository,
    question_repo: QuestionRepository,
    answer_repo: AnswerRepository,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            question_repo: QuestionRepository::new(db.clone()),
            answer_repo: AnswerRepository::new(db.clone()),
            db,
        }
    }

    /// Get a user by ID.
    pub async fn profile(&self, id: &str) -> AppResult<user::Model> {
        UserRepository::get_by_id(self.db.as_ref(), id).await
    }

    /// Get a user by username.
    pub async fn profile_by_username(&self, username: &str) -> AppResult<user::Model> {
        UserRepository::find_by_username(self.db.as_ref(), username)
            .await?
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }

    /// Update the caller's avatar and bio. A blank bio clears it.
    pub async fn update_profile(
        &self,
        session: &Session,
        input: UpdateProfileInput,
    ) -> AppResult<user::Model> {
        session.ensure_can_write()?;
        input.validate()?;

        let user = UserRepository::get_by_id(self.db.as_ref(), &session.user_id).await?;
        let mut active: user::ActiveModel = user.into();
        if let Some(avatar_url) = input.avatar_url {
            active.avatar_url = Set(non_blank(avatar_url));
        }
        if let Some(bio) = input.bio {
            active.bio = Set(non_blank(bio));
        }
        active.updated_at = Set(Some(Utc::now().into()));
        UserRepository::update(self.db.as_ref(), active).await
    }

    /// Activity numbers for a user.
    pub async fn stats(&self, id: &str) -> AppResult<UserStats> {
        let user = UserRepository::get_by_id(self.db.as_ref(), id).await?;
        let questions = self.question_repo.count_by_author(id).await?;
        let answers = self.answer_repo.count_by_author(id).await?;
        let accepted_answers =
            AnswerRepository::count_accepted_by_author(self.db.as_ref(), id).await?;

        Ok(UserStats {
            badges: user.badge_list(),
            user_id: user.id,
            karma: user.karma,
            questions,
            answers,
            accepted_answers,
            followers: user.follower_count,
            following: user.following_count,
        })
    }

    /// Questions the user asked, newest first.
    pub async fn questions_of(&self, id: &str) -> AppResult<Vec<question::Model>> {
        let user = UserRepository::get_by_id(self.db.as_ref(), id).await?;
        let mut questions = self
            .question_repo
            .find_by_ids(&user.question_id_list())
            .await?;
        questions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(questions)
    }

    /// Answers the user wrote, newest first, with their question titles.
    pub async fn answers_of(&self, id: &str) -> AppResult<Vec<AnswerWithQuestion>> {
        let user = UserRepository::get_by_id(self.db.as_ref(), id).await?;
        let answers = self.answer_repo.find_by_ids(&user.answer_id_list()).await?;

        let mut question_ids: Vec<String> = answers.iter().map(|a| a.question_id.clone()).collect();
        question_ids.sort_unstable();
        question_ids.dedup();
        let titles: HashMap<String, String> = self
            .question_repo
            .find_by_ids(&question_ids)
            .await?
            .into_iter()
            .map(|q| (q.id, q.title))
            .collect();

        Ok(answers
            .into_iter()
            .map(|answer| AnswerWithQuestion {
                question_title: titles.get(&answer.question_id).cloned(),
                answer,
            })
            .collect())
    }

    /// Top users by karma. `viewer` gets their own rank even when outside the top.
    pub async fn leaderboard(&self, viewer: Option<&str>) -> AppResult<Leaderboard> {
        let top = self.user_repo.top_by_karma(LEADERBOARD_SIZE).await?;
        let total_participants = self.user_repo.count().await?;

        let entries: Vec<LeaderboardEntry> = top
            .into_iter()
            .zip(1..)
            .map(|(user, rank)| LeaderboardEntry {
                rank,
                badges: user.badge_list(),
                user_id: user.id,
                username: user.username,
                avatar_url: user.avatar_url,
                karma: user.karma,
            })
            .collect();

        let viewer_rank = match viewer {
            None => None,
            Some(id) => match entries.iter().find(|e| e.user_id == id) {
                Some(entry) => Some(entry.rank),
                None => match UserRepository::find_by_id(self.db.as_ref(), id).await? {
                    Some(user) => Some(self.user_repo.rank_of(&user).await?),
                    None => None,
                },
            },
        };

        Ok(Leaderboard {
            entries,
            total_participants,
            viewer_rank,
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use stackit_db::entities::user::{Role, json_list};

    fn test_user(id: &str, username: &str, karma: i32) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: username.to_string(),
            username_lower: username.to_lowercase(),
            email: format!("{username}@example.com"),
            token: None,
            password_hash: String::new(),
            avatar_url: None,
            bio: None,
            role: Role::User,
            karma,
            badges: json_list(["First Contribution"]),
            is_banned: false,
            follower_count: 0,
            following_count: 0,
            questions_count: 0,
            answers_count: 0,
            accepted_answers: 0,
            question_ids: json_list(Vec::<String>::new()),
            answer_ids: json_list(Vec::<String>::new()),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank("  ".to_string()), None);
        assert_eq!(non_blank(" hi ".to_string()), Some("hi".to_string()));
    }

    #[test]
    fn test_profile_validation() {
        let input = UpdateProfileInput {
            avatar_url: Some("not a url".to_string()),
            bio: None,
        };
        assert!(input.validate().is_err());

        let input = UpdateProfileInput {
            avatar_url: None,
            bio: Some("x".repeat(501)),
        };
        assert!(input.validate().is_err());
    }

    #[tokio::test]
    async fn test_leaderboard_ranks_in_order() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([vec![
                    test_user("u2", "bob", 35),
                    test_user("u1", "alice", 5),
                ]])
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(2))
                }]])
                .into_connection(),
        );
        let service = UserService::new(db);

        let board = service.leaderboard(Some("u1")).await.unwrap();

        assert_eq!(board.entries.len(), 2);
        assert_eq!(board.entries[0].rank, 1);
        assert_eq!(board.entries[0].username, "bob");
        assert_eq!(board.entries[1].rank, 2);
        assert_eq!(board.total_participants, 2);
        assert_eq!(board.viewer_rank, Some(2));
    }
}
