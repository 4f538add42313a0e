//! Authentication endpoints.

use axum::{
    Extension, Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use stackit_common::AppResult;
use stackit_core::{SignInInput, SignUpInput, SignedIn};

use crate::{
    dto::UserResponse,
    extractors::AuthSession,
    middleware::{AppState, BearerToken},
    response::{ApiResponse, no_content},
};

/// Issued credentials.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub user: UserResponse,
}

impl From<SignedIn> for TokenResponse {
    fn from(signed_in: SignedIn) -> Self {
        Self {
            user: UserResponse::private(&signed_in.user),
            token: signed_in.token,
        }
    }
}

/// Create a new account.
async fn signup(
    State(state): State<AppState>,
    Json(input): Json<SignUpInput>,
) -> AppResult<ApiResponse<TokenResponse>> {
    let signed_in = state.account_service.sign_up(input).await?;
    Ok(ApiResponse::created(signed_in.into()))
}

/// Sign in with a username or email.
async fn signin(
    State(state): State<AppState>,
    Json(input): Json<SignInInput>,
) -> AppResult<ApiResponse<TokenResponse>> {
    let signed_in = state.account_service.sign_in(input).await?;
    Ok(ApiResponse::ok(signed_in.into()))
}

/// Invalidate the presented token.
async fn signout(
    AuthSession(_session): AuthSession,
    Extension(BearerToken(token)): Extension<BearerToken>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    state.account_service.sign_out(&token).await?;
    Ok(no_content())
}

/// The signed-in account.
async fn me(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<UserResponse>> {
    let user = state.account_service.current_user(&session).await?;
    Ok(ApiResponse::ok(UserResponse::private(&user)))
}

/// Create the auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/signout", post(signout))
        .route("/me", get(me))
}
