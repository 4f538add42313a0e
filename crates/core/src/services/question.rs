//! Question service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set};
use serde::{Deserialize, Serialize};
use stackit_common::{AppError, AppResult, IdGenerator, Metrics, get_metrics};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::question,
    repositories::{
        AnswerRepository, BookmarkRepository, NotificationRepository, QuestionRepository,
        TagRepository, VoteRepository,
    },
    run_atomic,
};
use validator::{Validate, ValidationError};

use crate::services::counters::ContentCounters;
use crate::services::event_bus::{EventBus, LedgerEvent};
use crate::services::karma::{KarmaEvent, KarmaService};
use crate::services::tag::{normalize_tag, normalize_tags};
use crate::session::Session;

/// Default page size of question listings.
pub const DEFAULT_LIMIT: u64 = 10;
/// Longest title, counted after trimming.
pub const MAX_TITLE_CHARS: usize = 255;
/// Largest page size of question listings.
pub const MAX_LIMIT: u64 = 100;
/// Most results a search returns.
pub const SEARCH_LIMIT: u64 = 50;

/// Input for asking a question.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AskQuestionInput {
    #[validate(custom(function = "validate_title"))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Input for editing a question. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestionInput {
    #[validate(custom(function = "validate_title"))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// A question with its tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDetail {
    pub question: question::Model,
    pub tags: Vec<String>,
}

impl QuestionDetail {
    /// Net score.
    #[must_use]
    pub const fn score(&self) -> i32 {
        self.question.score()
    }
}

/// What a question deletion removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedQuestion {
    pub question_id: String,
    pub answers_removed: usize,
    pub votes_removed: u64,
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    let chars = title.trim().chars().count();
    if chars == 0 || chars > MAX_TITLE_CHARS {
        let mut err = ValidationError::new("length");
        err.message = Some(format!("title must be 1 to {MAX_TITLE_CHARS} characters").into());
        return Err(err);
    }
    Ok(())
}

fn trimmed(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} must not be blank")));
    }
    Ok(value.to_string())
}

struct AskQuestion<'a> {
    author_id: &'a str,
    title: &'a str,
    description: &'a str,
    tags: &'a [String],
    is_anonymous: bool,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for AskQuestion<'a> {
    type Output = question::Model;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<question::Model> {
        let now = Utc::now();
        let model = question::ActiveModel {
            id: Set(self.id_gen.generate()),
            title: Set(self.title.to_string()),
            description: Set(self.description.to_string()),
            author_id: Set(self.author_id.to_string()),
            is_anonymous: Set(self.is_anonymous),
            upvotes: Set(0),
            downvotes: Set(0),
            views: Set(0),
            answer_count: Set(0),
            is_answered: Set(false),
            accepted_answer_id: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(None),
        };
        let question = QuestionRepository::create(txn, model).await?;

        let links: Vec<(String, String)> = self
            .tags
            .iter()
            .map(|name| (self.id_gen.generate(), name.clone()))
            .collect();
        TagRepository::link(txn, &question.id, &links).await?;
        for name in self.tags {
            TagRepository::upsert_increment(txn, self.id_gen.generate(), name, now.into()).await?;
        }

        ContentCounters::record_question_in(txn, self.author_id, &question.id).await?;
        Ok(question)
    }
}

struct UpdateQuestion<'a> {
    caller_id: &'a str,
    question_id: &'a str,
    title: Option<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for UpdateQuestion<'a> {
    type Output = QuestionDetail;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<QuestionDetail> {
        let question = QuestionRepository::get_by_id(txn, self.question_id).await?;
        if question.author_id != self.caller_id {
            return Err(AppError::Forbidden(
                "Only the author can edit this question".to_string(),
            ));
        }
        let now = Utc::now();

        let current_tags = TagRepository::names_for_question(txn, &question.id).await?;
        let tags = match &self.tags {
            Some(new_tags) if *new_tags != current_tags => {
                for name in current_tags.iter().filter(|t| !new_tags.contains(t)) {
                    TagRepository::decrement(txn, name).await?;
                }
                for name in new_tags.iter().filter(|t| !current_tags.contains(t)) {
                    TagRepository::upsert_increment(txn, self.id_gen.generate(), name, now.into())
                        .await?;
                }
                TagRepository::unlink_all(txn, &question.id).await?;
                let links: Vec<(String, String)> = new_tags
                    .iter()
                    .map(|name| (self.id_gen.generate(), name.clone()))
                    .collect();
                TagRepository::link(txn, &question.id, &links).await?;
                new_tags.clone()
            }
            _ => current_tags,
        };

        let mut active: question::ActiveModel = question.into();
        if let Some(ref title) = self.title {
            active.title = Set(title.clone());
        }
        if let Some(ref description) = self.description {
            active.description = Set(description.clone());
        }
        active.updated_at = Set(Some(now.into()));
        let question = QuestionRepository::update(txn, active).await?;

        Ok(QuestionDetail { question, tags })
    }
}

struct DeleteQuestion<'a> {
    session: &'a Session,
    question_id: &'a str,
}

#[async_trait]
impl<'a> UnitOfWork for DeleteQuestion<'a> {
    type Output = DeletedQuestion;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<DeletedQuestion> {
        let question = QuestionRepository::get_by_id(txn, self.question_id).await?;
        if !self.session.can_moderate(&question.author_id) {
            return Err(AppError::Forbidden(
                "Only the author or an admin can delete this question".to_string(),
            ));
        }

        let answers = AnswerRepository::find_by_question(txn, &question.id).await?;
        let mut targets: Vec<String> = answers.iter().map(|a| a.id.clone()).collect();
        targets.push(question.id.clone());
        let votes_removed = VoteRepository::delete_by_targets(txn, &targets).await?;

        BookmarkRepository::delete_by_question(txn, &question.id).await?;
        NotificationRepository::delete_by_question(txn, &question.id).await?;

        let tags = TagRepository::names_for_question(txn, &question.id).await?;
        TagRepository::unlink_all(txn, &question.id).await?;
        for name in &tags {
            TagRepository::decrement(txn, name).await?;
        }

        for answer in &answers {
            ContentCounters::forget_answer_in(txn, &answer.author_id, &answer.id, answer.is_accepted)
                .await?;
        }
        AnswerRepository::delete_by_question(txn, &question.id).await?;

        QuestionRepository::delete(txn, &question.id).await?;
        ContentCounters::forget_question_in(txn, &question.author_id, &question.id).await?;

        Ok(DeletedQuestion {
            question_id: question.id,
            answers_removed: answers.len(),
            votes_removed,
        })
    }
}

/// Question service for business logic.
#[derive(Clone)]
pub struct QuestionService {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    question_repo: QuestionRepository,
    tag_repo: TagRepository,
    karma: KarmaService,
    event_bus: Option<EventBus>,
    id_gen: IdGenerator,
}

impl QuestionService {
    /// Create a new question service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, policy: RetryPolicy, karma: KarmaService) -> Self {
        Self {
            question_repo: QuestionRepository::new(db.clone()),
            tag_repo: TagRepository::new(db.clone()),
            db,
            policy,
            karma,
            event_bus: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event bus.
    pub fn set_event_bus(&mut self, event_bus: EventBus) {
        self.event_bus = Some(event_bus);
    }

    /// Ask a question.
    ///
    /// The question, its tag links, tag counts and the author's counters
    /// commit together. Karma and the contribution badge follow separately.
    pub async fn ask(&self, session: &Session, input: AskQuestionInput) -> AppResult<QuestionDetail> {
        session.ensure_can_write()?;
        input.validate()?;

        let title = trimmed("title", &input.title)?;
        let description = trimmed("description", &input.description)?;
        let tags = normalize_tags(&input.tags)?;

        let work = AskQuestion {
            author_id: &session.user_id,
            title: &title,
            description: &description,
            tags: &tags,
            is_anonymous: input.is_anonymous,
            id_gen: &self.id_gen,
        };
        let question = run_atomic(&self.db, &self.policy, &work).await?;

        Metrics::incr(&get_metrics().questions_created);
        tracing::info!(
            question_id = %question.id,
            author_id = %session.user_id,
            tags = ?tags,
            "Question created"
        );

        self.karma
            .award_after_commit(
                &session.user_id,
                &KarmaEvent::QuestionAsked {
                    question_id: question.id.clone(),
                },
            )
            .await;

        if let Some(ref bus) = self.event_bus {
            bus.publish(LedgerEvent::QuestionCreated {
                question_id: question.id.clone(),
                author_id: session.user_id.clone(),
            });
        }

        Ok(QuestionDetail { question, tags })
    }

    /// Get a question with its tags.
    pub async fn get(&self, id: &str) -> AppResult<QuestionDetail> {
        let question = QuestionRepository::get_by_id(self.db.as_ref(), id).await?;
        let tags = TagRepository::names_for_question(self.db.as_ref(), id).await?;
        Ok(QuestionDetail { question, tags })
    }

    /// Record a view and return the question.
    pub async fn view(&self, id: &str) -> AppResult<QuestionDetail> {
        if !self.question_repo.increment_views(id).await? {
            return Err(AppError::QuestionNotFound(id.to_string()));
        }
        self.get(id).await
    }

    /// Newest questions.
    pub async fn list_recent(&self, limit: Option<u64>) -> AppResult<Vec<QuestionDetail>> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let questions = self.question_repo.find_recent(limit).await?;
        self.with_tags(questions).await
    }

    /// Questions carrying `tag`, newest first.
    pub async fn list_by_tag(&self, tag: &str) -> AppResult<Vec<QuestionDetail>> {
        let tag = normalize_tag(tag)?;
        let ids = self.tag_repo.question_ids_for_tag(&tag).await?;
        let questions = self.question_repo.find_by_ids(&ids).await?;
        self.with_tags(questions).await
    }

    /// Case-insensitive search over titles, descriptions and tags.
    pub async fn search(&self, term: &str) -> AppResult<Vec<QuestionDetail>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(AppError::InvalidArgument(
                "Search term must not be empty".to_string(),
            ));
        }
        let tagged = self.tag_repo.question_ids_matching(term).await?;
        let questions = self
            .question_repo
            .search(term, &tagged, SEARCH_LIMIT)
            .await?;
        self.with_tags(questions).await
    }

    /// Questions by IDs with their tags, in the order given by `ids`.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<QuestionDetail>> {
        let questions = self.question_repo.find_by_ids(ids).await?;
        let mut details = self.with_tags(questions).await?;
        details.sort_by_key(|d| ids.iter().position(|id| *id == d.question.id));
        Ok(details)
    }

    /// Edit a question. Only the author may edit.
    pub async fn update(
        &self,
        session: &Session,
        id: &str,
        input: UpdateQuestionInput,
    ) -> AppResult<QuestionDetail> {
        session.ensure_can_write()?;
        input.validate()?;

        let title = input
            .title
            .as_deref()
            .map(|t| trimmed("title", t))
            .transpose()?;
        let description = input
            .description
            .as_deref()
            .map(|d| trimmed("description", d))
            .transpose()?;
        let tags = input.tags.as_deref().map(normalize_tags).transpose()?;

        let work = UpdateQuestion {
            caller_id: &session.user_id,
            question_id: id,
            title,
            description,
            tags,
            id_gen: &self.id_gen,
        };
        let detail = run_atomic(&self.db, &self.policy, &work).await?;
        tracing::debug!(question_id = %id, "Question updated");
        Ok(detail)
    }

    /// Delete a question with its answers, votes, bookmarks and tag links.
    pub async fn delete(&self, session: &Session, id: &str) -> AppResult<DeletedQuestion> {
        session.ensure_can_write()?;

        let work = DeleteQuestion {
            session,
            question_id: id,
        };
        let deleted = run_atomic(&self.db, &self.policy, &work).await?;
        tracing::info!(
            question_id = %id,
            deleted_by = %session.user_id,
            answers_removed = deleted.answers_removed,
            "Question deleted"
        );
        Ok(deleted)
    }

    async fn with_tags(&self, questions: Vec<question::Model>) -> AppResult<Vec<QuestionDetail>> {
        let ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        let mut tags: HashMap<String, Vec<String>> = self.tag_repo.names_for_questions(&ids).await?;
        Ok(questions
            .into_iter()
            .map(|question| QuestionDetail {
                tags: tags.remove(&question.id).unwrap_or_default(),
                question,
            })
            .collect())
    }
}
