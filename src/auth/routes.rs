//! Passwordless login endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::{Json, Router};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use super::tokens::TokenIssuer;
use crate::api::{success, success_message};
use crate::error::ApiError;
use crate::mail::{Language, Mailer, magic_link_email};
use crate::store::Database;

/// Shared state for auth routes.
#[derive(Clone)]
pub struct AuthRouteState {
    pub db: Arc<dyn Database>,
    pub tokens: Arc<TokenIssuer>,
    pub mailer: Arc<dyn Mailer>,
    pub frontend_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct MagicLinkRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VerifyTokenRequest {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthenticatedUser {
    email: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct SessionData {
    token: String,
    user: AuthenticatedUser,
}

#[derive(Debug, Serialize)]
struct SessionUser {
    user: AuthenticatedUser,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// POST /api/auth/request-magic-link
async fn request_magic_link(
    State(state): State<AuthRouteState>,
    body: Result<Json<MagicLinkRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body.map(|b| b.0).unwrap_or_default();
    let email = non_empty(request.email)
        .ok_or_else(|| ApiError::BadRequest("Email is required".to_string()))?
        .to_lowercase();

    let user = state
        .db
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| {
            tracing::info!(email = %email, "Magic link requested for unknown email");
            ApiError::Forbidden("This email is not authorized to access EASYLEGAL".to_string())
        })?;

    let token = state
        .tokens
        .magic_link_token(&user.email, &user.name)
        .map_err(|e| {
            tracing::error!("Failed to sign magic link token: {e}");
            ApiError::Internal("Internal server error".to_string())
        })?;
    let link = format!(
        "{}/auth/verify?token={token}",
        state.frontend_url.trim_end_matches('/')
    );

    let language = Language::from_code(request.language.as_deref().unwrap_or("en"));
    let email_message = magic_link_email(language, &user.email, &user.name, &link);
    state.mailer.send(email_message).await.map_err(|e| {
        tracing::error!(to = %user.email, "Failed to send magic link: {e}");
        ApiError::Internal("Failed to send the login email. Please try again later.".to_string())
    })?;

    Ok(success_message("A login link has been sent to your email"))
}

/// POST /api/auth/verify-token
async fn verify_token(
    State(state): State<AuthRouteState>,
    body: Result<Json<VerifyTokenRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = body.map(|b| b.0).unwrap_or_default();
    let token = non_empty(request.token)
        .ok_or_else(|| ApiError::BadRequest("Token is required".to_string()))?;

    let claims = state
        .tokens
        .verify(&token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    if state.db.get_user_by_email(&claims.email).await?.is_none() {
        return Err(ApiError::Forbidden(
            "This email is not authorized to access EASYLEGAL".to_string(),
        ));
    }

    let session = state
        .tokens
        .session_token(&claims.email, &claims.name)
        .map_err(|e| {
            tracing::error!("Failed to sign session token: {e}");
            ApiError::Internal("Internal server error".to_string())
        })?;

    tracing::info!(email = %claims.email, "User logged in");
    Ok(success(
        StatusCode::OK,
        SessionData {
            token: session,
            user: AuthenticatedUser {
                email: claims.email,
                name: claims.name,
            },
        },
    ))
}

/// GET /api/auth/verify-session
async fn verify_session(
    State(state): State<AuthRouteState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Token is required".to_string()))?;

    let claims = state
        .tokens
        .verify(token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    Ok(success(
        StatusCode::OK,
        SessionUser {
            user: AuthenticatedUser {
                email: claims.email,
                name: claims.name,
            },
        },
    ))
}

/// Build the auth REST routes.
pub fn auth_routes(state: AuthRouteState) -> Router {
    Router::new()
        .route("/api/auth/request-magic-link", post(request_magic_link))
        .route("/api/auth/verify-token", post(verify_token))
        .route("/api/auth/verify-session", get(verify_session))
        .with_state(state)
}
