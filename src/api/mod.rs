//! REST API handlers

pub mod auth;
pub mod health;

use axum::http::StatusCode;

/// Unknown routes. Registered behind the bearer gate, so only
/// authenticated callers ever see this 404; the body is filled in by the
/// error normalization layer.
pub async fn fallback() -> StatusCode {
    StatusCode::NOT_FOUND
}
