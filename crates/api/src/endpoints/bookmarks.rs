//! Bookmark endpoints.

use axum::{Router, extract::State, routing::get};
use stackit_common::AppResult;

use crate::{
    dto::QuestionResponse, extractors::AuthSession, middleware::AppState, response::ApiResponse,
};

/// The caller's bookmarked questions.
async fn list(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<QuestionResponse>>> {
    let questions = state
        .bookmark_service
        .bookmarked_questions(&session.user_id)
        .await?;
    Ok(ApiResponse::ok(QuestionResponse::list(
        questions,
        Some(&session),
    )))
}

/// Create the bookmarks router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list))
}
