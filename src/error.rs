//! Error types for the intake service.

use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Startup errors surfaced by the binary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Flow definition and flow engine errors.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Could not find flow definition. Tried paths: {}", format_paths(.tried))]
    DefinitionNotFound { tried: Vec<PathBuf> },

    #[error("Failed to read flow definition {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse flow definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Duplicate question id {0} in flow definition")]
    DuplicateQuestion(i64),

    #[error("Flow engine not initialized")]
    NotInitialized,

    #[error("Start question {0} not found in configuration")]
    StartNodeNotFound(i64),

    #[error("Question {0} not found in configuration")]
    QuestionNotFound(i64),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Token issuance and verification errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("JWT secret is required")]
    MissingSecret,

    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Generative model provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Conversation session errors raised by the controller.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("User not found")]
    UserNotFound(i64),

    #[error("Conversation not found")]
    ConversationNotFound(i64),

    #[error("Conversation is not active")]
    NotActive(i64),

    #[error("{0}")]
    InvalidMessage(String),

    #[error("Invalid conversation state: missing current question ID")]
    MissingCurrentQuestion(i64),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned from HTTP handlers.
///
/// Every variant renders the `{success: false, message}` envelope the
/// frontend expects.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({
            "success": false,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity, .. } => Self::NotFound(format!("{entity} not found")),
            DatabaseError::Constraint(msg) => Self::Conflict(msg),
            other => {
                tracing::error!(error = %other, "Database failure");
                Self::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        tracing::error!(
            error = %err,
            timestamp = %chrono::Utc::now().to_rfc3339(),
            "Flow engine invariant violated"
        );
        Self::Internal("Internal server error".to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UserNotFound(_) | SessionError::ConversationNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            SessionError::NotActive(_) | SessionError::InvalidMessage(_) => {
                Self::BadRequest(err.to_string())
            }
            SessionError::MissingCurrentQuestion(id) => {
                tracing::error!(
                    conversation_id = id,
                    timestamp = %chrono::Utc::now().to_rfc3339(),
                    "Scripted conversation has no current question"
                );
                Self::Internal(err.to_string())
            }
            SessionError::Flow(e) => e.into(),
            SessionError::Database(e) => e.into(),
        }
    }
}
