//! JSON envelope shared by every HTTP endpoint: `{success, message?, data?}`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::ApiError;

/// Successful response carrying `data`.
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    (
        status,
        Json(serde_json::json!({
            "success": true,
            "data": data,
        })),
    )
        .into_response()
}

/// Successful response carrying only a message.
pub fn success_message(message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Unwrap a JSON body, turning malformed input into a 400.
pub fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Rejected request body");
        ApiError::BadRequest("Validation failed".to_string())
    })
}

/// Parse a numeric path id.
pub fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid {what} ID")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("12", "conversation").unwrap(), 12);
        assert!(parse_id("abc", "conversation").is_err());
        assert!(parse_id("0", "user").is_err());
        assert!(parse_id("-3", "user").is_err());
        assert_eq!(
            parse_id("x", "conversation").unwrap_err().to_string(),
            "Invalid conversation ID"
        );
    }

    #[test]
    fn success_envelope_shape() {
        let response = success(StatusCode::CREATED, serde_json::json!({"id": 1}));
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
