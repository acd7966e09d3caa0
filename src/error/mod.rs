//! Unified error handling for the auth gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Directory write failed: {0}")]
    DirectoryWriteFailed(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired refresh token")]
    InvalidOrExpiredRefreshToken,

    #[error("Token grant failed: {0}")]
    GrantFailed(String),

    #[error("Token revocation failed: {0}")]
    RevocationFailed(String),

    #[error("Logout failed: {0}")]
    LogoutFailed(#[source] Box<AppError>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl AppError {
    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UserAlreadyExists(_) => StatusCode::CONFLICT,
            AppError::DirectoryUnavailable(_)
            | AppError::DirectoryWriteFailed(_)
            | AppError::RevocationFailed(_)
            | AppError::LogoutFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::UserNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidCredentials
            | AppError::InvalidOrExpiredRefreshToken
            | AppError::GrantFailed(_)
            | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code placed in the `error` field
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UserAlreadyExists(_) => "user_already_exists",
            AppError::DirectoryUnavailable(_) => "directory_unavailable",
            AppError::DirectoryWriteFailed(_) => "directory_write_failed",
            AppError::UserNotFound(_) => "user_not_found",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::InvalidOrExpiredRefreshToken => "invalid_refresh_token",
            AppError::GrantFailed(_) => "authentication_failed",
            AppError::RevocationFailed(_) => "revocation_failed",
            AppError::LogoutFailed(_) => "logout_failed",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::BadRequest(_) => "bad_request",
            AppError::Validation(_) => "validation",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::UserAlreadyExists(_) => {
                "A user with this email already exists".to_string()
            }
            AppError::UserNotFound(_) => "User not found".to_string(),
            AppError::InvalidCredentials => "Invalid email or password".to_string(),
            AppError::InvalidOrExpiredRefreshToken => {
                "Refresh token is invalid or expired".to_string()
            }
            AppError::GrantFailed(cause) => {
                tracing::warn!("Token grant failed: {}", cause);
                "Authentication failed".to_string()
            }
            AppError::DirectoryUnavailable(cause) => {
                tracing::error!("Directory unavailable: {}", cause);
                "Identity directory is unavailable".to_string()
            }
            AppError::DirectoryWriteFailed(cause) => {
                tracing::error!("Directory write failed: {}", cause);
                "Identity directory rejected the change".to_string()
            }
            AppError::RevocationFailed(cause) => {
                tracing::error!("Token revocation failed: {}", cause);
                "Token revocation failed".to_string()
            }
            AppError::LogoutFailed(cause) => {
                tracing::error!("Logout failed: {}", cause);
                "Logout failed; the session may still be active".to_string()
            }
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "An internal error occurred".to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

// Conversion from validation errors
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = AppError::UserNotFound("abc".to_string());
        assert_eq!(err.to_string(), "User not found: abc");
    }

    #[test]
    fn test_error_conversion() {
        let err: AppError = anyhow::anyhow!("Something went wrong").into();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_logout_failed_keeps_cause() {
        use std::error::Error as _;

        let err = AppError::LogoutFailed(Box::new(AppError::RevocationFailed(
            "connection reset".to_string(),
        )));
        let source = err.source().expect("cause is preserved");
        assert!(source.to_string().contains("connection reset"));
    }

    #[rstest]
    #[case(AppError::UserAlreadyExists("a@b.c".into()), StatusCode::CONFLICT, "user_already_exists")]
    #[case(AppError::DirectoryUnavailable("x".into()), StatusCode::BAD_GATEWAY, "directory_unavailable")]
    #[case(AppError::DirectoryWriteFailed("x".into()), StatusCode::BAD_GATEWAY, "directory_write_failed")]
    #[case(AppError::UserNotFound("x".into()), StatusCode::NOT_FOUND, "user_not_found")]
    #[case(AppError::InvalidCredentials, StatusCode::UNAUTHORIZED, "invalid_credentials")]
    #[case(AppError::InvalidOrExpiredRefreshToken, StatusCode::UNAUTHORIZED, "invalid_refresh_token")]
    #[case(AppError::GrantFailed("x".into()), StatusCode::UNAUTHORIZED, "authentication_failed")]
    #[case(AppError::RevocationFailed("x".into()), StatusCode::BAD_GATEWAY, "revocation_failed")]
    #[case(AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "unauthorized")]
    #[case(AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "bad_request")]
    #[case(AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY, "validation")]
    #[tokio::test]
    async fn test_error_status_and_code(
        #[case] err: AppError,
        #[case] status: StatusCode,
        #[case] code: &str,
    ) {
        let response = err.into_response();
        assert_eq!(response.status(), status);

        let json = body_json(response).await;
        assert_eq!(json["error"], code);
        assert!(json["message"].is_string());
    }

    #[tokio::test]
    async fn test_server_side_errors_hide_cause() {
        let response =
            AppError::DirectoryUnavailable("admin token: connection refused".to_string())
                .into_response();
        let json = body_json(response).await;
        assert!(!json["message"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_internal_error_response() {
        let response = AppError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "internal_error");
        assert_eq!(json["message"], "An internal error occurred");
    }
}
