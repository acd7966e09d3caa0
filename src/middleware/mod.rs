//! HTTP middleware
//!
//! - Bearer token gate and the authenticated principal extractor
//! - Error response normalization
//! - Request span with sensitive query parameters redacted

pub mod auth;
pub mod error_response;
pub mod require_auth;
pub mod trace;

pub use auth::AuthError;
pub use error_response::normalize_error_response;
pub use require_auth::{require_auth_middleware, AuthMiddlewareState};
pub use trace::SanitizedMakeSpan;
