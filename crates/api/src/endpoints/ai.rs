//! AI writing assistant endpoints.
//!
//! These answer with bare JSON bodies (`{enhancedText}`, `{generatedText}`,
//! `{response, timestamp}`) rather than the `data` wrapper, matching what the
//! editor widgets consume.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use stackit_common::AppResult;
use stackit_core::{ChatReply, EnhanceKind};

use crate::{extractors::AuthSession, middleware::AppState};

/// Enhance request.
#[derive(Debug, Deserialize)]
pub struct EnhanceRequest {
    #[serde(rename = "type")]
    pub kind: EnhanceKind,
    pub text: String,
    pub context: Option<String>,
}

/// Enhance response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceResponse {
    pub enhanced_text: String,
}

/// Generate request.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub context: Option<String>,
}

/// Generate response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub generated_text: String,
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Rewrite text in a style.
async fn enhance_text(
    AuthSession(_session): AuthSession,
    State(state): State<AppState>,
    Json(req): Json<EnhanceRequest>,
) -> AppResult<Json<EnhanceResponse>> {
    let enhanced_text = state
        .ai_service
        .enhance(req.kind, &req.text, req.context.as_deref())
        .await?;
    Ok(Json(EnhanceResponse { enhanced_text }))
}

/// Generate text from a prompt.
async fn generate_content(
    AuthSession(_session): AuthSession,
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> AppResult<Json<GenerateResponse>> {
    let generated_text = state
        .ai_service
        .generate(&req.prompt, req.context.as_deref())
        .await?;
    Ok(Json(GenerateResponse { generated_text }))
}

/// Ask the coding assistant.
async fn chat(
    AuthSession(_session): AuthSession,
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> AppResult<Json<ChatReply>> {
    Ok(Json(state.ai_service.chat(&req.message).await?))
}

/// Create the AI router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/enhance-text", post(enhance_text))
        .route("/generate-content", post(generate_content))
        .route("/chat", post(chat))
}
