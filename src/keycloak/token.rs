//! Keycloak token endpoint: password grant, refresh grant and logout
//!
//! These calls are anonymous form posts carrying the static client identity;
//! they never use the admin token.

use super::client::KeycloakClient;
use super::types::KeycloakTokenResponse;
use crate::error::{AppError, Result};
use reqwest::StatusCode;

impl KeycloakClient {
    /// `client_id` plus `client_secret` when the client is confidential
    fn client_identity(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("client_id", self.config.client_id.as_str())];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        params
    }

    async fn post_token_form(
        &self,
        params: &[(&str, &str)],
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        self.http_client
            .post(self.config.token_url())
            .form(params)
            .send()
            .await
    }

    /// Exchange username and password for tokens
    pub(super) async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<KeycloakTokenResponse> {
        let mut params = self.client_identity();
        params.extend([
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
            ("scope", "openid"),
        ]);

        let response = self
            .post_token_form(&params)
            .await
            .map_err(|e| AppError::GrantFailed(format!("Password grant failed: {}", e)))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::InvalidCredentials);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GrantFailed(format!(
                "Password grant failed: {} - {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GrantFailed(format!("Failed to parse token response: {}", e)))
    }

    /// Exchange a refresh token for a new token set
    pub(super) async fn refresh_grant(&self, refresh_token: &str) -> Result<KeycloakTokenResponse> {
        let mut params = self.client_identity();
        params.extend([
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ]);

        let response = self
            .post_token_form(&params)
            .await
            .map_err(|e| AppError::GrantFailed(format!("Refresh grant failed: {}", e)))?;

        if matches!(
            response.status(),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
        ) {
            return Err(AppError::InvalidOrExpiredRefreshToken);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GrantFailed(format!(
                "Refresh grant failed: {} - {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GrantFailed(format!("Failed to parse token response: {}", e)))
    }

    /// End the session behind a refresh token
    pub(super) async fn logout(&self, refresh_token: &str) -> Result<()> {
        let mut params = self.client_identity();
        params.push(("refresh_token", refresh_token));

        let response = self
            .http_client
            .post(self.config.logout_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::RevocationFailed(format!("Failed to logout: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::RevocationFailed(format!(
                "Failed to logout: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}
