//! Identity provider capability used by the credential service

use super::client::KeycloakClient;
use super::types::{KeycloakTokenResponse, KeycloakUser};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::fmt;

/// A user as held by the identity provider's directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
}

impl TryFrom<KeycloakUser> for DirectoryUser {
    type Error = AppError;

    fn try_from(user: KeycloakUser) -> Result<Self> {
        let id = user.id.ok_or_else(|| {
            AppError::DirectoryUnavailable(format!(
                "Directory returned user '{}' without an id",
                user.username
            ))
        })?;

        Ok(Self {
            id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            email_verified: user.email_verified,
        })
    }
}

/// Data for a user about to be created. New users are always enabled and
/// start with an unverified email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDirectoryUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Tokens issued by a successful grant
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_expires_in: u64,
}

impl From<KeycloakTokenResponse> for TokenGrant {
    fn from(response: KeycloakTokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            expires_in: response.expires_in,
            refresh_expires_in: response.refresh_expires_in,
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("token_type", &self.token_type)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .finish()
    }
}

/// Operations the credential service needs from the identity provider.
///
/// Using a trait here keeps the service tests independent from HTTP mocking.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exact-match search on the email attribute
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<DirectoryUser>>;

    /// Create an enabled user with an unverified email, returning its id
    async fn create_user(&self, user: &NewDirectoryUser) -> Result<String>;

    /// Set a password credential on an existing user
    async fn set_password(&self, user_id: &str, password: &str, temporary: bool) -> Result<()>;

    async fn delete_user(&self, user_id: &str) -> Result<()>;

    async fn get_user_by_id(&self, user_id: &str) -> Result<DirectoryUser>;

    /// Resource-owner password grant against the realm's token endpoint
    async fn password_grant(&self, username: &str, password: &str) -> Result<TokenGrant>;

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// Revoke the session behind a refresh token
    async fn revoke(&self, refresh_token: &str) -> Result<()>;
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<DirectoryUser>> {
        self.search_users_by_email(email)
            .await?
            .into_iter()
            .map(DirectoryUser::try_from)
            .collect()
    }

    async fn create_user(&self, user: &NewDirectoryUser) -> Result<String> {
        KeycloakClient::create_user(self, user).await
    }

    async fn set_password(&self, user_id: &str, password: &str, temporary: bool) -> Result<()> {
        self.reset_user_password(user_id, password, temporary)
            .await
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        KeycloakClient::delete_user(self, user_id).await
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<DirectoryUser> {
        self.get_user(user_id).await?.try_into()
    }

    async fn password_grant(&self, username: &str, password: &str) -> Result<TokenGrant> {
        KeycloakClient::password_grant(self, username, password)
            .await
            .map(TokenGrant::from)
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenGrant> {
        KeycloakClient::refresh_grant(self, refresh_token)
            .await
            .map(TokenGrant::from)
    }

    async fn revoke(&self, refresh_token: &str) -> Result<()> {
        self.logout(refresh_token).await
    }
}
