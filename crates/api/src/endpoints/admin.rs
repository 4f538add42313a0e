//! Admin endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use stackit_common::AppResult;
use stackit_core::{QuestionCounts, RecountSummary, UserCounts};
use stackit_db::entities::user::Role;

use crate::{
    dto::UserResponse, extractors::AuthSession, middleware::AppState, response::ApiResponse,
};

/// User listing query.
#[derive(Debug, Deserialize)]
pub struct UsersQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// A page of users.
#[derive(Serialize)]
pub struct UsersResponse {
    pub users: Vec<UserResponse>,
    pub total: u64,
}

/// Ban request.
#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub banned: bool,
}

/// Role request.
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

/// Tag recount result.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecountResponse {
    pub tags_checked: usize,
}

/// List users, oldest first.
async fn list_users(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Query(query): Query<UsersQuery>,
) -> AppResult<ApiResponse<UsersResponse>> {
    let page = state
        .admin_service
        .list_users(&session, query.limit, query.offset)
        .await?;
    Ok(ApiResponse::ok(UsersResponse {
        users: page.users.iter().map(UserResponse::private).collect(),
        total: page.total,
    }))
}

/// Ban or unban a user.
async fn set_banned(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<BanRequest>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state
        .admin_service
        .set_banned(&session, &id, req.banned)
        .await?;
    Ok(ApiResponse::ok(UserResponse::private(&user)))
}

/// Change a user's role.
async fn set_role(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RoleRequest>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.admin_service.set_role(&session, &id, req.role).await?;
    Ok(ApiResponse::ok(UserResponse::private(&user)))
}

/// Re-derive one user's counters.
async fn recount_user(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<UserCounts>> {
    let counts = state.admin_service.recount_user(&session, &id).await?;
    Ok(ApiResponse::ok(counts))
}

/// Re-derive one question's counters.
async fn recount_question(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<QuestionCounts>> {
    let counts = state.admin_service.recount_question(&session, &id).await?;
    Ok(ApiResponse::ok(counts))
}

/// Re-derive tag counts.
async fn recount_tags(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<TagRecountResponse>> {
    let tags_checked = state.admin_service.recount_tags(&session).await?;
    Ok(ApiResponse::ok(TagRecountResponse { tags_checked }))
}

/// Re-derive every counter.
async fn recount_all(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<RecountSummary>> {
    let summary = state.admin_service.recount_all(&session).await?;
    Ok(ApiResponse::ok(summary))
}

/// Create the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/ban", post(set_banned))
        .route("/users/{id}/role", post(set_role))
        .route("/recount", post(recount_all))
        .route("/recount/tags", post(recount_tags))
        .route("/recount/users/{id}", post(recount_user))
        .route("/recount/questions/{id}", post(recount_question))
}
