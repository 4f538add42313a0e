//! Wire representations of ledger entities.

#![allow(missing_docs)]

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use stackit_core::{AnswerWithQuestion, QuestionDetail, Session};
use stackit_db::entities::{
    answer, karma_history,
    notification::{self, NotificationType},
    tag,
    user::{self, Role},
};

/// Public view of a user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    /// Only present on the caller's own account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub role: Role,
    pub karma: i32,
    pub badges: Vec<String>,
    pub is_banned: bool,
    pub follower_count: i32,
    pub following_count: i32,
    pub questions_count: i32,
    pub answers_count: i32,
    pub accepted_answers: i32,
    pub created_at: DateTime<FixedOffset>,
}

impl UserResponse {
    /// The caller's own account, email included.
    #[must_use]
    pub fn private(user: &user::Model) -> Self {
        Self {
            email: Some(user.email.clone()),
            ..Self::from(user)
        }
    }
}

impl From<&user::Model> for UserResponse {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            email: None,
            avatar_url: user.avatar_url.clone(),
            bio: user.bio.clone(),
            role: user.role,
            karma: user.karma,
            badges: user.badge_list(),
            is_banned: user.is_banned,
            follower_count: user.follower_count,
            following_count: user.following_count,
            questions_count: user.questions_count,
            answers_count: user.answers_count,
            accepted_answers: user.accepted_answers,
            created_at: user.created_at,
        }
    }
}

/// A question as readers see it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Hidden from everyone but the author when the question is anonymous.
    pub author_id: Option<String>,
    pub is_anonymous: bool,
    pub tags: Vec<String>,
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
    pub views: i32,
    pub answer_count: i32,
    pub is_answered: bool,
    pub accepted_answer_id: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: Option<DateTime<FixedOffset>>,
}

impl QuestionResponse {
    /// Render `detail` for `viewer`.
    #[must_use]
    pub fn for_viewer(detail: QuestionDetail, viewer: Option<&Session>) -> Self {
        let score = detail.score();
        let q = detail.question;
        let author_visible = !q.is_anonymous || viewer.is_some_and(|s| s.can_moderate(&q.author_id));

        Self {
            author_id: author_visible.then_some(q.author_id),
            id: q.id,
            title: q.title,
            description: q.description,
            is_anonymous: q.is_anonymous,
            tags: detail.tags,
            upvotes: q.upvotes,
            downvotes: q.downvotes,
            score,
            views: q.views,
            answer_count: q.answer_count,
            is_answered: q.is_answered,
            accepted_answer_id: q.accepted_answer_id,
            created_at: q.created_at,
            updated_at: q.updated_at,
        }
    }

    /// Render a list for `viewer`.
    #[must_use]
    pub fn list(details: Vec<QuestionDetail>, viewer: Option<&Session>) -> Vec<Self> {
        details
            .into_iter()
            .map(|d| Self::for_viewer(d, viewer))
            .collect()
    }
}

/// An answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub id: String,
    pub question_id: String,
    pub content: String,
    pub author_id: String,
    pub upvotes: i32,
    pub downvotes: i32,
    pub score: i32,
    pub is_accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_title: Option<String>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: Option<DateTime<FixedOffset>>,
}

impl From<answer::Model> for AnswerResponse {
    fn from(a: answer::Model) -> Self {
        Self {
            score: a.score(),
            id: a.id,
            question_id: a.question_id,
            content: a.content,
            author_id: a.author_id,
            upvotes: a.upvotes,
            downvotes: a.downvotes,
            is_accepted: a.is_accepted,
            question_title: None,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl From<AnswerWithQuestion> for AnswerResponse {
    fn from(item: AnswerWithQuestion) -> Self {
        Self {
            question_title: item.question_title,
            ..Self::from(item.answer)
        }
    }
}

/// A notification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub question_id: Option<String>,
    pub actor_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<FixedOffset>,
}

impl From<notification::Model> for NotificationResponse {
    fn from(n: notification::Model) -> Self {
        Self {
            id: n.id,
            notification_type: n.notification_type,
            message: n.message,
            question_id: n.question_id,
            actor_id: n.actor_id,
            is_read: n.is_read,
            created_at: n.created_at,
        }
    }
}

/// A tag with its question count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagResponse {
    pub name: String,
    pub question_count: i32,
}

impl From<tag::Model> for TagResponse {
    fn from(t: tag::Model) -> Self {
        Self {
            name: t.name,
            question_count: t.question_count,
        }
    }
}

/// One karma ledger line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KarmaEntryResponse {
    pub points: i32,
    pub reason: String,
    pub created_at: DateTime<FixedOffset>,
}

impl From<karma_history::Model> for KarmaEntryResponse {
    fn from(k: karma_history::Model) -> Self {
        Self {
            points: k.points,
            reason: k.reason,
            created_at: k.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stackit_db::entities::question;

    fn detail(is_anonymous: bool) -> QuestionDetail {
        QuestionDetail {
            question: question::Model {
                id: "q1".to_string(),
                title: "How do lifetimes work?".to_string(),
                description: "<p>Details</p>".to_string(),
                author_id: "author".to_string(),
                is_anonymous,
                upvotes: 3,
                downvotes: 1,
                views: 10,
                answer_count: 0,
                is_answered: false,
                accepted_answer_id: None,
                created_at: Utc::now().into(),
                updated_at: None,
            },
            tags: vec!["rust".to_string()],
        }
    }

    fn session(user_id: &str) -> Session {
        Session {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            role: Role::User,
            is_banned: false,
        }
    }

    #[test]
    fn test_anonymous_author_hidden_from_others() {
        let reader = session("reader");
        let rendered = QuestionResponse::for_viewer(detail(true), Some(&reader));
        assert_eq!(rendered.author_id, None);
        assert_eq!(rendered.score, 2);

        let rendered = QuestionResponse::for_viewer(detail(true), None);
        assert_eq!(rendered.author_id, None);
    }

    #[test]
    fn test_anonymous_author_visible_to_author() {
        let author = session("author");
        let rendered = QuestionResponse::for_viewer(detail(true), Some(&author));
        assert_eq!(rendered.author_id.as_deref(), Some("author"));
    }

    #[test]
    fn test_named_question_shows_author() {
        let rendered = QuestionResponse::for_viewer(detail(false), None);
        assert_eq!(rendered.author_id.as_deref(), Some("author"));

        let json = serde_json::to_value(&rendered).unwrap();
        assert_eq!(json["answerCount"], 0);
        assert_eq!(json["tags"][0], "rust");
    }
}
