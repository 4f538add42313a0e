//! Tag endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use stackit_common::AppResult;

use crate::{
    dto::TagResponse, extractors::AuthSession, middleware::AppState, response::ApiResponse,
};

/// Popular tags query.
#[derive(Debug, Deserialize)]
pub struct PopularQuery {
    pub limit: Option<u64>,
}

/// Tag follow result.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagFollowResponse {
    pub tag: String,
    pub following: bool,
    pub changed: bool,
}

/// Every tag, most used first.
async fn list(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<TagResponse>>> {
    let tags = state.tag_service.list().await?;
    Ok(ApiResponse::ok(tags.into_iter().map(TagResponse::from).collect()))
}

/// The most used tags.
async fn popular(
    State(state): State<AppState>,
    Query(query): Query<PopularQuery>,
) -> AppResult<ApiResponse<Vec<TagResponse>>> {
    let tags = state
        .tag_service
        .popular(query.limit.unwrap_or(10).clamp(1, 100))
        .await?;
    Ok(ApiResponse::ok(tags.into_iter().map(TagResponse::from).collect()))
}

/// Tags the caller follows.
async fn followed(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<String>>> {
    let tags = state.follow_service.followed_tags(&session.user_id).await?;
    Ok(ApiResponse::ok(tags))
}

/// Follow a tag.
async fn follow(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> AppResult<ApiResponse<TagFollowResponse>> {
    let changed = state.follow_service.follow_tag(&session, &tag).await?;
    Ok(ApiResponse::ok(TagFollowResponse {
        tag,
        following: true,
        changed,
    }))
}

/// Unfollow a tag.
async fn unfollow(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> AppResult<ApiResponse<TagFollowResponse>> {
    let changed = state.follow_service.unfollow_tag(&session, &tag).await?;
    Ok(ApiResponse::ok(TagFollowResponse {
        tag,
        following: false,
        changed,
    }))
}

/// Create the tags router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/popular", get(popular))
        .route("/followed", get(followed))
        .route("/{tag}/follow", post(follow).delete(unfollow))
}
