//! Follow entity (user follows user, or user follows tag).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What is being followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "lowercase")]
pub enum FollowType {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "tag")]
    Tag,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "follow")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub follower_id: String,

    /// Set when `follow_type` is `user`
    #[sea_orm(nullable)]
    pub following_id: Option<String>,

    /// Set when `follow_type` is `tag`
    #[sea_orm(nullable)]
    pub following_tag: Option<String>,

    pub follow_type: FollowType,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::FollowerId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Follower,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::FollowingId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Following,
}

impl ActiveModelBehavior for ActiveModel {}
