//! HTTP surface: assembles every route group behind CORS and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::get;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::admin::{AdminRouteState, admin_routes};
use crate::assistant::Assistant;
use crate::auth::{AuthRouteState, TokenIssuer, auth_routes};
use crate::conversation::{ConversationRouteState, SessionController, conversation_routes};
use crate::flow::FlowEngine;
use crate::mail::Mailer;
use crate::store::Database;

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub flow: Arc<FlowEngine>,
    pub assistant: Arc<dyn Assistant>,
    pub tokens: Arc<TokenIssuer>,
    pub mailer: Arc<dyn Mailer>,
    pub frontend_url: String,
}

/// GET /api/health
async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "The API is running")
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin: {e}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Build the full application router.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let controller = Arc::new(SessionController::new(
        Arc::clone(&state.db),
        Arc::clone(&state.flow),
        Arc::clone(&state.assistant),
    ));

    Router::new()
        .route("/api/health", get(health))
        .merge(conversation_routes(ConversationRouteState { controller }))
        .merge(auth_routes(AuthRouteState {
            db: Arc::clone(&state.db),
            tokens: Arc::clone(&state.tokens),
            mailer: Arc::clone(&state.mailer),
            frontend_url: state.frontend_url.clone(),
        }))
        .merge(admin_routes(AdminRouteState {
            db: Arc::clone(&state.db),
        }))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}
