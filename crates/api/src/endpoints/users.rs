//! User endpoints: profiles, activity, follows and the leaderboard.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use serde::{Deserialize, Serialize};
use stackit_common::AppResult;
use stackit_core::{Leaderboard, UpdateProfileInput, UserStats};

use crate::{
    dto::{AnswerResponse, KarmaEntryResponse, QuestionResponse, UserResponse},
    extractors::{AuthSession, MaybeSession},
    middleware::AppState,
    response::ApiResponse,
};

/// Default karma history length.
const KARMA_HISTORY_LIMIT: u64 = 20;

/// Follow state after a follow or unfollow.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowStateResponse {
    pub following: bool,
    /// False when the request matched the existing state.
    pub changed: bool,
}

/// Karma history query.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u64>,
}

/// Show a user.
async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.user_service.profile(&id).await?;
    Ok(ApiResponse::ok(UserResponse::from(&user)))
}

/// Show a user by username.
async fn show_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.user_service.profile_by_username(&username).await?;
    Ok(ApiResponse::ok(UserResponse::from(&user)))
}

/// Update the caller's profile.
async fn update_profile(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Json(input): Json<UpdateProfileInput>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.user_service.update_profile(&session, input).await?;
    Ok(ApiResponse::ok(UserResponse::private(&user)))
}

/// Activity numbers of a user.
async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<UserStats>> {
    Ok(ApiResponse::ok(state.user_service.stats(&id).await?))
}

/// Questions a user asked. Anonymous ones are listed only to their author.
async fn questions(
    MaybeSession(viewer): MaybeSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<QuestionResponse>>> {
    let own = viewer.as_ref().is_some_and(|s| s.can_moderate(&id));
    let ids: Vec<String> = state
        .user_service
        .questions_of(&id)
        .await?
        .into_iter()
        .filter(|q| own || !q.is_anonymous)
        .map(|q| q.id)
        .collect();

    let details = state.question_service.find_by_ids(&ids).await?;
    Ok(ApiResponse::ok(QuestionResponse::list(details, viewer.as_ref())))
}

/// Answers a user wrote, with question titles.
async fn answers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<AnswerResponse>>> {
    let answers = state.user_service.answers_of(&id).await?;
    Ok(ApiResponse::ok(
        answers.into_iter().map(AnswerResponse::from).collect(),
    ))
}

/// Newest karma history entries.
async fn karma(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<ApiResponse<Vec<KarmaEntryResponse>>> {
    let history = state
        .karma_service
        .history(&id, query.limit.unwrap_or(KARMA_HISTORY_LIMIT))
        .await?;
    Ok(ApiResponse::ok(
        history.into_iter().map(KarmaEntryResponse::from).collect(),
    ))
}

/// Users following a user.
async fn followers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<UserResponse>>> {
    let users = state.follow_service.followers(&id).await?;
    Ok(ApiResponse::ok(users.iter().map(UserResponse::from).collect()))
}

/// Users a user follows.
async fn following(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<Vec<UserResponse>>> {
    let users = state.follow_service.following(&id).await?;
    Ok(ApiResponse::ok(users.iter().map(UserResponse::from).collect()))
}

/// Whether the caller follows a user.
async fn follow_state(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<FollowStateResponse>> {
    let following = state
        .follow_service
        .is_following(&session.user_id, &id)
        .await?;
    Ok(ApiResponse::ok(FollowStateResponse {
        following,
        changed: false,
    }))
}

/// Follow a user.
async fn follow(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<FollowStateResponse>> {
    let changed = state.follow_service.follow_user(&session, &id).await?;
    Ok(ApiResponse::ok(FollowStateResponse {
        following: true,
        changed,
    }))
}

/// Unfollow a user.
async fn unfollow(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<FollowStateResponse>> {
    let changed = state.follow_service.unfollow_user(&session, &id).await?;
    Ok(ApiResponse::ok(FollowStateResponse {
        following: false,
        changed,
    }))
}

/// Karma leaderboard, with the caller's rank when signed in.
async fn leaderboard(
    MaybeSession(viewer): MaybeSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Leaderboard>> {
    let board = state
        .user_service
        .leaderboard(viewer.as_ref().map(|s| s.user_id.as_str()))
        .await?;
    Ok(ApiResponse::ok(board))
}

/// Create the users router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", patch(update_profile))
        .route("/by-username/{username}", get(show_by_username))
        .route("/{id}", get(show))
        .route("/{id}/stats", get(stats))
        .route("/{id}/questions", get(questions))
        .route("/{id}/answers", get(answers))
        .route("/{id}/karma", get(karma))
        .route("/{id}/followers", get(followers))
        .route("/{id}/following", get(following))
        .route(
            "/{id}/follow",
            get(follow_state).post(follow).delete(unfollow),
        )
}

/// Create the leaderboard router.
pub fn leaderboard_router() -> Router<AppState> {
    Router::new().route("/", get(leaderboard))
}
