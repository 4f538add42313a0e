//! Notification endpoints.

use axum::{
    Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use stackit_common::AppResult;

use crate::{
    dto::NotificationResponse,
    extractors::AuthSession,
    middleware::AppState,
    response::{ApiResponse, no_content},
};

/// Unread count.
#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Newest notifications of the caller.
async fn list(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<NotificationResponse>>> {
    let notifications = state.notification_service.list(&session).await?;
    Ok(ApiResponse::ok(
        notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    ))
}

/// How many notifications are unread.
async fn unread_count(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.unread_count(&session).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Mark one notification as read.
async fn mark_read(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.notification_service.mark_read(&session, &id).await?;
    Ok(no_content())
}

/// Mark every notification as read.
async fn mark_all_read(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.mark_all_read(&session).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Create the notifications router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/{id}/read", post(mark_read))
}
