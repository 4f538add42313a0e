//! Vote lookup endpoints.

use std::collections::HashMap;

use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use stackit_common::AppResult;
use stackit_db::entities::vote::VoteType;

use crate::{extractors::AuthSession, middleware::AppState, response::ApiResponse};

/// Most targets one lookup may name.
const MAX_TARGETS: usize = 200;

/// Comma separated target IDs.
#[derive(Debug, Deserialize)]
pub struct MineQuery {
    #[serde(default)]
    pub ids: String,
}

/// The caller's vote on each target; `null` where there is none.
async fn mine(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Query(query): Query<MineQuery>,
) -> AppResult<ApiResponse<HashMap<String, Option<VoteType>>>> {
    let ids: Vec<String> = query
        .ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .take(MAX_TARGETS)
        .map(ToString::to_string)
        .collect();

    let votes = state.vote_service.user_votes(&session.user_id, &ids).await?;
    Ok(ApiResponse::ok(votes))
}

/// Create the votes router.
pub fn router() -> Router<AppState> {
    Router::new().route("/mine", get(mine))
}
