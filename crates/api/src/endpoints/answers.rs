//! Answer endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use stackit_common::AppResult;
use stackit_core::{AnswerInput, VoteOutcome};
use stackit_db::entities::vote::TargetType;

use crate::{
    dto::AnswerResponse,
    endpoints::questions::VoteRequest,
    extractors::AuthSession,
    middleware::AppState,
    response::ApiResponse,
};

/// One answer.
async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<AnswerResponse>> {
    let answer = state.answer_service.get(&id).await?;
    Ok(ApiResponse::ok(answer.into()))
}

/// Edit an answer.
async fn update(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<AnswerInput>,
) -> AppResult<ApiResponse<AnswerResponse>> {
    let answer = state.answer_service.update(&session, &id, input).await?;
    Ok(ApiResponse::ok(answer.into()))
}

/// Delete an answer.
async fn delete(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<AnswerResponse>> {
    let answer = state.answer_service.delete(&session, &id).await?;
    Ok(ApiResponse::ok(answer.into()))
}

/// Vote on an answer.
async fn vote(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<VoteOutcome>> {
    let outcome = state
        .vote_service
        .cast_vote(&session, &id, TargetType::Answer, req.vote)
        .await?;
    Ok(ApiResponse::ok(outcome))
}

/// Create the answers router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(show).patch(update).delete(delete))
        .route("/{id}/vote", post(vote))
}
