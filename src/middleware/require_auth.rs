//! Bearer token gate
//!
//! Every route except the fixed public allowlist requires a valid bearer
//! token. The verified identity is stored in the request extensions where
//! handlers pick it up through the [`AuthenticatedPrincipal`] extractor.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use super::auth::{extract_bearer_token, AuthError};
use crate::domain::AuthenticatedPrincipal;
use crate::jwt::JwksVerifier;

/// Paths reachable without a bearer token (exact match)
pub const PUBLIC_PATHS: &[&str] = &[
    "/api/v1/auth/register",
    "/api/v1/auth/login",
    "/api/v1/auth/refresh",
    "/api/v1/auth/logout",
    "/actuator/health",
    "/actuator/info",
];

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

/// Shared state for authentication middleware
#[derive(Clone)]
pub struct AuthMiddlewareState {
    verifier: JwksVerifier,
}

impl AuthMiddlewareState {
    pub fn new(verifier: JwksVerifier) -> Self {
        Self { verifier }
    }
}

/// Authentication enforcement middleware
pub async fn require_auth_middleware(
    State(auth_state): State<AuthMiddlewareState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let principal = match authenticate(&auth_state.verifier, request.headers()).await {
        Ok(principal) => principal,
        Err(err) => {
            match &err {
                AuthError::KeysUnavailable(msg) => {
                    error!("Cannot verify bearer token, signing keys unavailable: {}", msg)
                }
                other => debug!(path = %request.uri().path(), "Rejected request: {:?}", other),
            }
            return err.into_response();
        }
    };

    request.extensions_mut().insert(principal);
    next.run(request).await
}

async fn authenticate(
    verifier: &JwksVerifier,
    headers: &HeaderMap,
) -> Result<AuthenticatedPrincipal, AuthError> {
    let token = extract_bearer_token(headers)?;
    Ok(verifier.verify(token).await?)
}
