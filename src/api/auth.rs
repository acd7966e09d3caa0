//! Credential endpoints under `/api/v1/auth`

use crate::domain::{
    AuthenticatedPrincipal, Credentials, RefreshTokenRequest, RegistrationRequest, TokenSet,
    UserProfile,
};
use crate::error::Result;
use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegistrationRequest>,
) -> Result<impl IntoResponse> {
    let profile = state.credential_service.register(input).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<Credentials>,
) -> Result<Json<TokenSet>> {
    let tokens = state.credential_service.login(input).await?;
    Ok(Json(tokens))
}

/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(input): Json<RefreshTokenRequest>,
) -> Result<Json<TokenSet>> {
    input.validate()?;
    let tokens = state
        .credential_service
        .refresh(&input.refresh_token)
        .await?;
    Ok(Json(tokens))
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Json(input): Json<RefreshTokenRequest>,
) -> Result<StatusCode> {
    input.validate()?;
    state.credential_service.logout(&input.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    principal: AuthenticatedPrincipal,
) -> Result<Json<UserProfile>> {
    let profile = state.credential_service.get_profile(&principal).await?;
    Ok(Json(profile))
}
