//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[sea_orm(string_value = "guest")]
    Guest,
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "admin")]
    Admin,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique)]
    pub username: String,

    #[sea_orm(unique)]
    pub username_lower: String,

    /// Stored lowercase
    #[sea_orm(unique)]
    pub email: String,

    /// Bearer session token
    #[sea_orm(unique, nullable)]
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    #[sea_orm(nullable)]
    pub avatar_url: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub bio: Option<String>,

    pub role: Role,

    #[sea_orm(default_value = 0)]
    pub karma: i32,

    /// JSON array of badge names
    #[sea_orm(column_type = "Json")]
    pub badges: Json,

    #[sea_orm(default_value = false)]
    pub is_banned: bool,

    // Denormalized counters, repaired by recount
    #[sea_orm(default_value = 0)]
    pub follower_count: i32,

    #[sea_orm(default_value = 0)]
    pub following_count: i32,

    #[sea_orm(default_value = 0)]
    pub questions_count: i32,

    #[sea_orm(default_value = 0)]
    pub answers_count: i32,

    /// Answers by this user that are currently accepted
    #[sea_orm(default_value = 0)]
    pub accepted_answers: i32,

    /// JSON array of authored question IDs
    #[sea_orm(column_type = "Json")]
    pub question_ids: Json,

    /// JSON array of authored answer IDs
    #[sea_orm(column_type = "Json")]
    pub answer_ids: Json,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Badge names in unlock order.
    #[must_use]
    pub fn badge_list(&self) -> Vec<String> {
        string_list(&self.badges)
    }

    /// Whether the badge is already unlocked.
    #[must_use]
    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges
            .as_array()
            .is_some_and(|badges| badges.iter().any(|b| b.as_str() == Some(badge)))
    }

    /// Authored question IDs.
    #[must_use]
    pub fn question_id_list(&self) -> Vec<String> {
        string_list(&self.question_ids)
    }

    /// Authored answer IDs.
    #[must_use]
    pub fn answer_id_list(&self) -> Vec<String> {
        string_list(&self.answer_ids)
    }

    /// Whether this user may perform admin operations.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Read a JSON array of strings, skipping anything that is not a string.
#[must_use]
pub fn string_list(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Build a JSON array from strings.
#[must_use]
pub fn json_list<I, S>(items: I) -> Json
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Json::Array(items.into_iter().map(|s| Json::String(s.into())).collect())
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::question::Entity")]
    Questions,

    #[sea_orm(has_many = "super::answer::Entity")]
    Answers,
}

impl Related<super::question::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Questions.def()
    }
}

impl Related<super::answer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Answers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
