//! Keycloak Admin API client
//!
//! Covers the directory half of the identity provider: admin token caching,
//! user search, creation, password reset, lookup and deletion. The token
//! endpoint half lives in [`super::token`].

use crate::config::KeycloakConfig;
use crate::error::{AppError, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::provider::NewDirectoryUser;
use super::types::*;

/// Keycloak client shared by every request
#[derive(Clone)]
pub struct KeycloakClient {
    pub(super) config: KeycloakConfig,
    pub(super) http_client: Client,
    token: Arc<RwLock<Option<AdminToken>>>,
}

#[derive(Debug, Clone)]
struct AdminToken {
    access_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

impl KeycloakClient {
    /// Create a new Keycloak client
    pub fn new(config: KeycloakConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Get the realm name
    pub fn realm(&self) -> &str {
        &self.config.realm
    }

    /// Get admin access token (with caching)
    async fn get_admin_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(ref t) = *token {
                if t.expires_at > chrono::Utc::now() + chrono::Duration::seconds(30) {
                    return Ok(t.access_token.clone());
                }
            }
        }

        let mut params: Vec<(&str, &str)> = vec![("client_id", self.config.admin_client_id.as_str())];
        match (&self.config.admin_username, &self.config.admin_password) {
            (Some(username), Some(password)) => {
                params.push(("grant_type", "password"));
                params.push(("username", username.as_str()));
                params.push(("password", password.as_str()));
            }
            _ => params.push(("grant_type", "client_credentials")),
        }
        if let Some(secret) = &self.config.admin_client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http_client
            .post(self.config.admin_token_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                AppError::DirectoryUnavailable(format!("Failed to get admin token: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DirectoryUnavailable(format!(
                "Failed to get admin token: {} - {}",
                status, body
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AppError::DirectoryUnavailable(format!("Failed to parse admin token response: {}", e))
        })?;

        let admin_token = AdminToken {
            access_token: token_response.access_token.clone(),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(token_response.expires_in),
        };

        {
            let mut token = self.token.write().await;
            *token = Some(admin_token);
        }
        debug!("Refreshed Keycloak admin token");

        Ok(token_response.access_token)
    }

    fn user_url(&self, user_id: &str) -> String {
        format!(
            "{}/{}",
            self.config.admin_users_url(),
            urlencoding::encode(user_id)
        )
    }

    /// Search users by exact email
    pub(super) async fn search_users_by_email(&self, email: &str) -> Result<Vec<KeycloakUser>> {
        let token = self.get_admin_token().await?;

        let response = self
            .http_client
            .get(self.config.admin_users_url())
            .query(&[("email", email), ("exact", "true")])
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AppError::DirectoryUnavailable(format!("Failed to search users: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DirectoryUnavailable(format!(
                "Failed to search users: {} - {}",
                status, body
            )));
        }

        let users: Vec<KeycloakUser> = response
            .json()
            .await
            .map_err(|e| AppError::DirectoryUnavailable(format!("Failed to parse users: {}", e)))?;

        Ok(users)
    }

    /// Create a user, returning the id Keycloak assigned to it
    pub(super) async fn create_user(&self, user: &NewDirectoryUser) -> Result<String> {
        let token = self.get_admin_token().await?;
        let input = CreateKeycloakUserInput {
            username: user.email.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            enabled: true,
            email_verified: false,
        };

        let response = self
            .http_client
            .post(self.config.admin_users_url())
            .bearer_auth(&token)
            .json(&input)
            .send()
            .await
            .map_err(|e| AppError::DirectoryWriteFailed(format!("Failed to create user: {}", e)))?;

        if response.status() == StatusCode::CONFLICT {
            return Err(AppError::UserAlreadyExists(user.email.clone()));
        }

        if response.status() != StatusCode::CREATED {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DirectoryWriteFailed(format!(
                "Failed to create user: {} - {}",
                status, body
            )));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::DirectoryWriteFailed("Missing location header".to_string()))?;

        parse_user_id(&self.config.url, location)
    }

    /// Get a user by ID
    pub(super) async fn get_user(&self, user_id: &str) -> Result<KeycloakUser> {
        let token = self.get_admin_token().await?;

        let response = self
            .http_client
            .get(self.user_url(user_id))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AppError::DirectoryUnavailable(format!("Failed to get user: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::UserNotFound(user_id.to_string()));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DirectoryUnavailable(format!(
                "Failed to get user: {} - {}",
                status, body
            )));
        }

        let user: KeycloakUser = response
            .json()
            .await
            .map_err(|e| AppError::DirectoryUnavailable(format!("Failed to parse user: {}", e)))?;

        Ok(user)
    }

    /// Replace the user's password credential
    pub(super) async fn reset_user_password(
        &self,
        user_id: &str,
        password: &str,
        temporary: bool,
    ) -> Result<()> {
        let token = self.get_admin_token().await?;
        let credential = KeycloakCredential::password(password, temporary);

        let response = self
            .http_client
            .put(format!("{}/reset-password", self.user_url(user_id)))
            .bearer_auth(&token)
            .json(&credential)
            .send()
            .await
            .map_err(|e| AppError::DirectoryWriteFailed(format!("Failed to reset password: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::UserNotFound(user_id.to_string()));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DirectoryWriteFailed(format!(
                "Failed to reset password: {} - {}",
                status, body
            )));
        }

        Ok(())
    }

    /// Delete a user. A user that is already gone counts as deleted.
    pub(super) async fn delete_user(&self, user_id: &str) -> Result<()> {
        let token = self.get_admin_token().await?;

        let response = self
            .http_client
            .delete(self.user_url(user_id))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| AppError::DirectoryWriteFailed(format!("Failed to delete user: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::DirectoryWriteFailed(format!(
                "Failed to delete user: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Extract the user id from a `Location` header, which may be absolute or
/// relative to the Keycloak base URL.
fn parse_user_id(base_url: &str, location: &str) -> Result<String> {
    let invalid = || AppError::DirectoryWriteFailed(format!("Invalid location header: {}", location));

    let base = url::Url::parse(base_url).map_err(|_| invalid())?;
    let resolved = base.join(location).map_err(|_| invalid())?;

    let segment = resolved
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .ok_or_else(invalid)?;

    let user_id = urlencoding::decode(segment).map_err(|_| invalid())?;
    if user_id.is_empty() || user_id == "users" {
        return Err(invalid());
    }

    Ok(user_id.into_owned())
}
