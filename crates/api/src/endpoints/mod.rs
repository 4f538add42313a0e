//! API endpoints.

mod admin;
mod ai;
mod answers;
mod auth;
mod bookmarks;
mod metrics;
mod notifications;
mod questions;
mod tags;
mod users;
mod votes;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/questions", questions::router())
        .nest("/answers", answers::router())
        .nest("/votes", votes::router())
        .nest("/users", users::router())
        .nest("/leaderboard", users::leaderboard_router())
        .nest("/tags", tags::router())
        .nest("/bookmarks", bookmarks::router())
        .nest("/notifications", notifications::router())
        .nest("/admin", admin::router())
        .nest("/ai", ai::router())
        .nest("/streaming", sse::router())
        .nest("/metrics", metrics::router())
}
