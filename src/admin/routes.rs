//! User management endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use super::validation::{CreateUserInput, UpdateUserInput};
use crate::api::{parse_body, parse_id, success, success_message};
use crate::error::ApiError;
use crate::store::Database;

const DUPLICATE_EMAIL: &str = "A user with this email already exists";

/// Shared state for admin routes.
#[derive(Clone)]
pub struct AdminRouteState {
    pub db: Arc<dyn Database>,
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

/// GET /api/admin/users
async fn list_users(State(state): State<AdminRouteState>) -> Result<Response, ApiError> {
    let users = state.db.list_users().await?;
    Ok(success(StatusCode::OK, users))
}

/// GET /api/admin/users/{id}
async fn get_user(
    State(state): State<AdminRouteState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id, "user")?;
    let user = state.db.get_user(id).await?.ok_or_else(user_not_found)?;
    Ok(success(StatusCode::OK, user))
}

/// POST /api/admin/users
async fn create_user(
    State(state): State<AdminRouteState>,
    body: Result<Json<CreateUserInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = parse_body(body)?.validate().map_err(ApiError::BadRequest)?;

    if state.db.get_user_by_email(&input.email).await?.is_some() {
        return Err(ApiError::Conflict(DUPLICATE_EMAIL.to_string()));
    }

    let user = state.db.create_user(&input.email, &input.name).await?;
    tracing::info!(user_id = user.id, email = %user.email, "User created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "User created successfully",
            "data": user,
        })),
    )
        .into_response())
}

/// PUT /api/admin/users/{id}
async fn update_user(
    State(state): State<AdminRouteState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateUserInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id, "user")?;
    let update = parse_body(body)?.validate().map_err(ApiError::BadRequest)?;

    let existing = state.db.get_user(id).await?.ok_or_else(user_not_found)?;

    if let Some(email) = update.email.as_deref().filter(|e| *e != existing.email) {
        if state.db.get_user_by_email(email).await?.is_some() {
            return Err(ApiError::Conflict(DUPLICATE_EMAIL.to_string()));
        }
    }

    let user = state
        .db
        .update_user(id, &update)
        .await?
        .ok_or_else(user_not_found)?;
    tracing::info!(user_id = user.id, "User updated");
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": "User updated successfully",
            "data": user,
        })),
    )
        .into_response())
}

/// DELETE /api/admin/users/{id}
async fn delete_user(
    State(state): State<AdminRouteState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id, "user")?;
    if !state.db.delete_user(id).await? {
        return Err(user_not_found());
    }
    tracing::info!(user_id = id, "User deleted");
    Ok(success_message("User deleted successfully"))
}

/// Build the admin REST routes.
pub fn admin_routes(state: AdminRouteState) -> Router {
    Router::new()
        .route("/api/admin/users", get(list_users).post(create_user))
        .route(
            "/api/admin/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .with_state(state)
}
