//! Tag repository (tag counts and question tag links).

use std::collections::HashMap;
use std::sync::Arc;

use crate::db_err;
use crate::entities::{QuestionTag, Tag, question_tag, tag};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, sea_query::Expr,
};
use stackit_common::AppResult;

/// Tag repository for database operations.
#[derive(Clone)]
pub struct TagRepository {
    db: Arc<DatabaseConnection>,
}

impl TagRepository {
    /// Create a new tag repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a tag by name.
    pub async fn find_by_name<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> AppResult<Option<tag::Model>> {
        Tag::find()
            .filter(tag::Column::Name.eq(name))
            .one(conn)
            .await
            .map_err(db_err)
    }

    /// Create the tag with a count of one, or increment its count.
    ///
    /// A concurrent creation of the same tag surfaces as a unique-key
    /// conflict and is retried by the caller's unit of work.
    pub async fn upsert_increment<C: ConnectionTrait>(
        conn: &C,
        id: String,
        name: &str,
        now: chrono::DateTime<chrono::FixedOffset>,
    ) -> AppResult<()> {
        if Self::find_by_name(conn, name).await?.is_some() {
            Tag::update_many()
                .col_expr(
                    tag::Column::QuestionCount,
                    Expr::col(tag::Column::QuestionCount).add(1),
                )
                .filter(tag::Column::Name.eq(name))
                .exec(conn)
                .await
                .map_err(db_err)?;
        } else {
            let model = tag::ActiveModel {
                id: Set(id),
                name: Set(name.to_string()),
                question_count: Set(1),
                created_at: Set(now),
            };
            model.insert(conn).await.map_err(db_err)?;
        }
        Ok(())
    }

    /// Decrement a tag's count, never below zero.
    pub async fn decrement<C: ConnectionTrait>(conn: &C, name: &str) -> AppResult<()> {
        Tag::update_many()
            .col_expr(
                tag::Column::QuestionCount,
                Expr::col(tag::Column::QuestionCount).sub(1),
            )
            .filter(tag::Column::Name.eq(name))
            .filter(tag::Column::QuestionCount.gt(0))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Overwrite a tag's count (reconciliation).
    pub async fn set_count<C: ConnectionTrait>(conn: &C, name: &str, count: i32) -> AppResult<()> {
        Tag::update_many()
            .col_expr(tag::Column::QuestionCount, Expr::value(count))
            .filter(tag::Column::Name.eq(name))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// All tags.
    pub async fn all<C: ConnectionTrait>(conn: &C) -> AppResult<Vec<tag::Model>> {
        Tag::find()
            .order_by_asc(tag::Column::Name)
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Tags by question count, then name.
    pub async fn find_popular(&self, limit: u64) -> AppResult<Vec<tag::Model>> {
        Tag::find()
            .order_by_desc(tag::Column::QuestionCount)
            .order_by_asc(tag::Column::Name)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    // === Question links ===

    /// Link tags to a question, preserving order.
    pub async fn link<C: ConnectionTrait>(
        conn: &C,
        question_id: &str,
        tags: &[(String, String)],
    ) -> AppResult<()> {
        for (position, (id, name)) in tags.iter().enumerate() {
            let model = question_tag::ActiveModel {
                id: Set(id.clone()),
                question_id: Set(question_id.to_string()),
                tag_name: Set(name.clone()),
                position: Set(position as i32),
            };
            model.insert(conn).await.map_err(db_err)?;
        }
        Ok(())
    }

    /// Remove every tag link of a question.
    pub async fn unlink_all<C: ConnectionTrait>(conn: &C, question_id: &str) -> AppResult<()> {
        QuestionTag::delete_many()
            .filter(question_tag::Column::QuestionId.eq(question_id))
            .exec(conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Tag names of a question in order.
    pub async fn names_for_question<C: ConnectionTrait>(
        conn: &C,
        question_id: &str,
    ) -> AppResult<Vec<String>> {
        QuestionTag::find()
            .select_only()
            .column(question_tag::Column::TagName)
            .filter(question_tag::Column::QuestionId.eq(question_id))
            .order_by_asc(question_tag::Column::Position)
            .into_tuple::<String>()
            .all(conn)
            .await
            .map_err(db_err)
    }

    /// Tag names for several questions, keyed by question ID.
    pub async fn names_for_questions(
        &self,
        question_ids: &[String],
    ) -> AppResult<HashMap<String, Vec<String>>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        if question_ids.is_empty() {
            return Ok(map);
        }
        let links = QuestionTag::find()
            .filter(question_tag::Column::QuestionId.is_in(question_ids.iter().cloned()))
            .order_by_asc(question_tag::Column::QuestionId)
            .order_by_asc(question_tag::Column::Position)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        for link in links {
            map.entry(link.question_id).or_default().push(link.tag_name);
        }
        Ok(map)
    }

    /// IDs of questions carrying a tag.
    pub async fn question_ids_for_tag(&self, name: &str) -> AppResult<Vec<String>> {
        QuestionTag::find()
            .select_only()
            .column(question_tag::Column::QuestionId)
            .filter(question_tag::Column::TagName.eq(name))
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// IDs of questions carrying any tag whose name contains `term`.
    pub async fn question_ids_matching(&self, term: &str) -> AppResult<Vec<String>> {
        QuestionTag::find()
            .select_only()
            .column(question_tag::Column::QuestionId)
            .filter(question_tag::Column::TagName.contains(term.to_lowercase()))
            .distinct()
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(db_err)
    }

    /// Count questions linked to a tag.
    pub async fn count_links<C: ConnectionTrait>(conn: &C, name: &str) -> AppResult<u64> {
        QuestionTag::find()
            .filter(question_tag::Column::TagName.eq(name))
            .count(conn)
            .await
            .map_err(db_err)
    }
}
