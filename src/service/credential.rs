//! Credential lifecycle: register, login, refresh, logout and profile lookup

use crate::domain::{
    AuthenticatedPrincipal, Credentials, RegistrationRequest, TokenSet, UserProfile,
};
use crate::error::{AppError, Result};
use crate::keycloak::{DirectoryUser, IdentityProvider, NewDirectoryUser, TokenGrant};
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

/// Translates credential requests into identity provider calls and narrows
/// the provider's failures to the error kinds each operation may report.
pub struct CredentialService {
    provider: Arc<dyn IdentityProvider>,
}

impl CredentialService {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Register a new user with a permanent password.
    ///
    /// The email pre-check is advisory; a conflict reported by the provider
    /// on create is the authoritative uniqueness guard. If the password
    /// cannot be set, the freshly created user is deleted once and the
    /// password failure is reported as a directory write failure.
    pub async fn register(&self, request: RegistrationRequest) -> Result<UserProfile> {
        request.validate()?;

        let existing = self.provider.find_users_by_email(&request.email).await?;
        if !existing.is_empty() {
            info!(email = %request.email, "Registration rejected, email already registered");
            return Err(AppError::UserAlreadyExists(request.email));
        }

        let new_user = NewDirectoryUser {
            email: request.email.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
        };
        let user_id = self.provider.create_user(&new_user).await?;

        if let Err(e) = self
            .provider
            .set_password(&user_id, &request.password, false)
            .await
        {
            error!(
                email = %request.email,
                user_id = %user_id,
                "Failed to set password for new user, removing it: {}", e
            );
            if let Err(cleanup) = self.provider.delete_user(&user_id).await {
                error!(
                    user_id = %user_id,
                    "Failed to remove partially registered user: {}", cleanup
                );
            }
            return Err(as_write_failure(e));
        }

        info!(email = %request.email, user_id = %user_id, "User registered");

        Ok(UserProfile {
            id: user_id,
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            email_verified: false,
        })
    }

    /// Authenticate with email and password
    pub async fn login(&self, credentials: Credentials) -> Result<TokenSet> {
        credentials.validate()?;

        let grant = self
            .provider
            .password_grant(&credentials.email, &credentials.password)
            .await
            .map_err(|e| match e {
                AppError::InvalidCredentials => {
                    info!(email = %credentials.email, "Login rejected, invalid credentials");
                    AppError::InvalidCredentials
                }
                other => as_grant_failure(other),
            })?;

        info!(email = %credentials.email, "User logged in");
        token_set(grant)
    }

    /// Exchange a refresh token for a new token set
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        if refresh_token.is_empty() {
            return Err(AppError::Validation(
                "Refresh token must not be empty".to_string(),
            ));
        }

        let grant = self
            .provider
            .refresh_grant(refresh_token)
            .await
            .map_err(|e| match e {
                AppError::InvalidOrExpiredRefreshToken => {
                    info!("Refresh rejected, token invalid or expired");
                    AppError::InvalidOrExpiredRefreshToken
                }
                other => as_grant_failure(other),
            })?;

        token_set(grant)
    }

    /// Revoke the session behind a refresh token. Attempted exactly once.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        if refresh_token.is_empty() {
            return Err(AppError::Validation(
                "Refresh token must not be empty".to_string(),
            ));
        }

        self.provider.revoke(refresh_token).await.map_err(|e| {
            warn!("Logout failed: {}", e);
            AppError::LogoutFailed(Box::new(e))
        })?;

        info!("User logged out");
        Ok(())
    }

    /// Profile of the authenticated caller. The user id is only ever taken
    /// from the verified token subject.
    pub async fn get_profile(&self, principal: &AuthenticatedPrincipal) -> Result<UserProfile> {
        let user = self
            .provider
            .get_user_by_id(&principal.subject)
            .await
            .map_err(|e| match e {
                AppError::UserNotFound(id) => AppError::UserNotFound(id),
                AppError::DirectoryUnavailable(msg) => AppError::DirectoryUnavailable(msg),
                other => AppError::DirectoryUnavailable(other.to_string()),
            })?;

        Ok(user_profile(user))
    }
}

fn as_grant_failure(e: AppError) -> AppError {
    match e {
        AppError::GrantFailed(msg) => AppError::GrantFailed(msg),
        other => AppError::GrantFailed(other.to_string()),
    }
}

/// Every password-set failure during registration is a failed directory write
fn as_write_failure(e: AppError) -> AppError {
    match e {
        AppError::DirectoryWriteFailed(msg) => AppError::DirectoryWriteFailed(msg),
        other => AppError::DirectoryWriteFailed(other.to_string()),
    }
}

fn token_set(grant: TokenGrant) -> Result<TokenSet> {
    if grant.expires_in == 0 {
        return Err(AppError::GrantFailed(
            "Token response reported no access token lifetime".to_string(),
        ));
    }
    let refresh_token = grant.refresh_token.ok_or_else(|| {
        AppError::GrantFailed("Token response did not include a refresh token".to_string())
    })?;

    Ok(TokenSet {
        access_token: grant.access_token,
        refresh_token,
        token_type: grant.token_type,
        expires_in: grant.expires_in,
        refresh_expires_in: grant.refresh_expires_in,
    })
}

fn user_profile(user: DirectoryUser) -> UserProfile {
    UserProfile {
        id: user.id,
        email: user.email.unwrap_or(user.username),
        first_name: user.first_name.unwrap_or_default(),
        last_name: user.last_name.unwrap_or_default(),
        email_verified: user.email_verified,
    }
}
