//! Question endpoints, including the answers, votes and acceptance nested under a question.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use stackit_common::AppResult;
use stackit_core::{
    AcceptanceOutcome, AnswerInput, AskQuestionInput, DeletedQuestion, UpdateQuestionInput,
    VoteOutcome,
};
use stackit_db::entities::vote::{TargetType, VoteType};

use crate::{
    dto::{AnswerResponse, QuestionResponse},
    extractors::{AuthSession, MaybeSession},
    middleware::AppState,
    response::ApiResponse,
};

/// Listing query.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
}

/// Search query.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Vote request.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub vote: VoteType,
}

/// Accept request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    pub answer_id: String,
}

/// Bookmark toggle result.
#[derive(Serialize)]
pub struct BookmarkResponse {
    pub bookmarked: bool,
}

/// Newest questions.
async fn list(
    MaybeSession(viewer): MaybeSession,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<QuestionResponse>>> {
    let questions = state.question_service.list_recent(query.limit).await?;
    Ok(ApiResponse::ok(QuestionResponse::list(questions, viewer.as_ref())))
}

/// Questions matching a term in title, body or tags.
async fn search(
    MaybeSession(viewer): MaybeSession,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<ApiResponse<Vec<QuestionResponse>>> {
    let questions = state.question_service.search(&query.q).await?;
    Ok(ApiResponse::ok(QuestionResponse::list(questions, viewer.as_ref())))
}

/// Questions carrying a tag.
async fn tagged(
    MaybeSession(viewer): MaybeSession,
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> AppResult<ApiResponse<Vec<QuestionResponse>>> {
    let questions = state.question_service.list_by_tag(&tag).await?;
    Ok(ApiResponse::ok(QuestionResponse::list(questions, viewer.as_ref())))
}

/// Ask a question.
async fn ask(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Json(input): Json<AskQuestionInput>,
) -> AppResult<ApiResponse<QuestionResponse>> {
    let question = state.question_service.ask(&session, input).await?;
    Ok(ApiResponse::created(QuestionResponse::for_viewer(
        question,
        Some(&session),
    )))
}

/// One question.
async fn show(
    MaybeSession(viewer): MaybeSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<QuestionResponse>> {
    let question = state.question_service.get(&id).await?;
    Ok(ApiResponse::ok(QuestionResponse::for_viewer(
        question,
        viewer.as_ref(),
    )))
}

/// Record a view and return the question.
async fn view(
    MaybeSession(viewer): MaybeSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<QuestionResponse>> {
    let question = state.question_service.view(&id).await?;
    Ok(ApiResponse::ok(QuestionResponse::for_viewer(
        question,
        viewer.as_ref(),
    )))
}

/// Edit a question.
async fn update(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateQuestionInput>,
) -> AppResult<ApiResponse<QuestionResponse>> {
    let question = state.question_service.update(&session, &id, input).await?;
    Ok(ApiResponse::ok(QuestionResponse::for_viewer(
        question,
        Some(&session),
    )))
}

/// Delete a question with its answers and votes.
async fn delete(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<DeletedQuestion>> {
    let deleted = state.question_service.delete(&session, &id).await?;
    Ok(ApiResponse::ok(deleted))
}

/// Answers of a question, accepted first.
async fn answers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<AnswerResponse>>> {
    let answers = state.answer_service.list_for_question(&id).await?;
    Ok(ApiResponse::ok(
        answers.into_iter().map(AnswerResponse::from).collect(),
    ))
}

/// Answer a question.
async fn post_answer(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<AnswerInput>,
) -> AppResult<ApiResponse<AnswerResponse>> {
    let answer = state.answer_service.post(&session, &id, input).await?;
    Ok(ApiResponse::created(answer.into()))
}

/// Accept an answer.
async fn accept(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AcceptRequest>,
) -> AppResult<ApiResponse<AcceptanceOutcome>> {
    let outcome = state
        .acceptance_service
        .accept_answer(&session, &id, &req.answer_id)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

/// Vote on a question.
async fn vote(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<VoteOutcome>> {
    let outcome = state
        .vote_service
        .cast_vote(&session, &id, TargetType::Question, req.vote)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

/// Toggle a bookmark on a question.
async fn bookmark(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<BookmarkResponse>> {
    let bookmarked = state.bookmark_service.toggle_bookmark(&session, &id).await?;
    Ok(ApiResponse::ok(BookmarkResponse { bookmarked }))
}

/// Create the questions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(ask))
        .route("/search", get(search))
        .route("/tagged/{tag}", get(tagged))
        .route("/{id}", get(show).patch(update).delete(delete))
        .route("/{id}/view", post(view))
        .route("/{id}/answers", get(answers).post(post_answer))
        .route("/{id}/accept", post(accept))
        .route("/{id}/vote", post(vote))
        .route("/{id}/bookmark", post(bookmark))
}
