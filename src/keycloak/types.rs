//! Keycloak wire representations
//!
//! Only the fields this service reads or writes are modelled; unknown fields
//! in Keycloak responses are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keycloak user representation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUser {
    pub id: Option<String>,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub email_verified: bool,
}

/// Input for creating a user in Keycloak
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeycloakUserInput {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub enabled: bool,
    pub email_verified: bool,
}

/// Body of `PUT /users/{id}/reset-password`
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakCredential {
    #[serde(rename = "type")]
    pub credential_type: String,
    pub value: String,
    pub temporary: bool,
}

impl KeycloakCredential {
    pub fn password(value: &str, temporary: bool) -> Self {
        Self {
            credential_type: "password".to_string(),
            value: value.to_string(),
            temporary,
        }
    }
}

impl fmt::Debug for KeycloakCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeycloakCredential")
            .field("credential_type", &self.credential_type)
            .field("value", &"[REDACTED]")
            .field("temporary", &self.temporary)
            .finish()
    }
}

/// Token endpoint response (RFC 6749 section 5.1 plus Keycloak extensions)
#[derive(Clone, Deserialize)]
pub struct KeycloakTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}
