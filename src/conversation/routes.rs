//! REST endpoints for intake conversations.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::controller::SessionController;
use super::model::ConversationMode;
use crate::api::{parse_body, parse_id, success};
use crate::error::ApiError;

/// Shared state for conversation routes.
#[derive(Clone)]
pub struct ConversationRouteState {
    pub controller: Arc<SessionController>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    user_id: i64,
    #[serde(default)]
    mode: ConversationMode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest {
    conversation_id: i64,
    message: String,
}

/// POST /api/conversation/start
async fn start_conversation(
    State(state): State<ConversationRouteState>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = parse_body(body)?;
    if request.user_id <= 0 {
        return Err(ApiError::BadRequest("Validation failed".to_string()));
    }

    let started = state
        .controller
        .start(request.user_id, request.mode)
        .await?;
    Ok(success(StatusCode::CREATED, started))
}

/// POST /api/conversation/message
async fn send_message(
    State(state): State<ConversationRouteState>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = parse_body(body)?;
    if request.conversation_id <= 0 {
        return Err(ApiError::BadRequest("Validation failed".to_string()));
    }

    let outcome = state
        .controller
        .submit_turn(request.conversation_id, &request.message)
        .await?;
    Ok(success(StatusCode::OK, outcome))
}

/// GET /api/conversation/{id}
async fn get_conversation(
    State(state): State<ConversationRouteState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id, "conversation")?;
    let view = state.controller.get(id).await?;
    Ok(success(StatusCode::OK, view))
}

/// Build the conversation REST routes.
pub fn conversation_routes(state: ConversationRouteState) -> Router {
    Router::new()
        .route("/api/conversation/start", post(start_conversation))
        .route("/api/conversation/message", post(send_message))
        .route("/api/conversation/{id}", get(get_conversation))
        .with_state(state)
}
