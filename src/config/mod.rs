//! Configuration management for the auth gateway

use anyhow::{Context, Result};
use std::env;
use std::fmt;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Keycloak configuration
    pub keycloak: KeycloakConfig,
    /// Bearer token verification configuration
    pub bearer: BearerConfig,
    /// Logging configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Clone)]
pub struct KeycloakConfig {
    /// Internal URL for server-to-server communication (e.g., http://keycloak:8080)
    pub url: String,
    /// Public URL the realm's tokens are issued under (e.g., https://sso.example.com)
    pub public_url: String,
    /// Realm holding the end users
    pub realm: String,
    /// Client used for password and refresh grants
    pub client_id: String,
    /// Secret of `client_id`; `None` for public clients
    pub client_secret: Option<String>,
    /// Realm the admin client authenticates against (usually "master")
    pub admin_realm: String,
    pub admin_client_id: String,
    pub admin_client_secret: Option<String>,
    /// Admin user for the password grant. When absent the admin client
    /// authenticates with `client_credentials` instead.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    /// Timeout applied to every outbound Keycloak call
    pub timeout_secs: u64,
}

impl KeycloakConfig {
    /// Token endpoint of the user realm
    pub fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.url, self.realm
        )
    }

    /// Logout (refresh-token revocation) endpoint of the user realm
    pub fn logout_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/logout",
            self.url, self.realm
        )
    }

    /// Published signing keys of the user realm
    pub fn certs_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/certs",
            self.url, self.realm
        )
    }

    /// Token endpoint of the admin realm
    pub fn admin_token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.url, self.admin_realm
        )
    }

    /// Base of the admin REST API for the user realm
    pub fn admin_users_url(&self) -> String {
        format!("{}/admin/realms/{}/users", self.url, self.realm)
    }

    /// Issuer claim Keycloak puts into tokens of the user realm
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.public_url, self.realm)
    }
}

impl fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("url", &self.url)
            .field("public_url", &self.public_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &redacted(&self.client_secret))
            .field("admin_realm", &self.admin_realm)
            .field("admin_client_id", &self.admin_client_id)
            .field("admin_client_secret", &redacted(&self.admin_client_secret))
            .field("admin_username", &self.admin_username)
            .field("admin_password", &redacted(&self.admin_password))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn redacted(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "[REDACTED]")
}

/// Bearer token verification settings
#[derive(Debug, Clone)]
pub struct BearerConfig {
    /// Expected `iss` claim. Defaults to the realm issuer derived from the
    /// Keycloak public URL.
    pub issuer: Option<String>,
    /// Accepted `aud` values. Empty disables the audience check; Keycloak
    /// access tokens usually carry `account` rather than the client id.
    pub audiences: Vec<String>,
    /// Clock skew tolerated on `exp` and `nbf`
    pub leeway_secs: u64,
    /// How long a fetched JWKS is trusted before it is fetched again
    pub jwks_cache_secs: u64,
    /// Minimum gap between two forced JWKS refreshes triggered by unknown key ids
    pub jwks_min_refresh_secs: u64,
}

impl Default for BearerConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audiences: vec![],
            leeway_secs: 30,
            jwks_cache_secs: 300,
            jwks_min_refresh_secs: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" for structured logs, anything else for human-readable output
    pub log_format: String,
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "pretty".to_string(),
            service_name: "auth-gateway".to_string(),
        }
    }
}

/// Read an environment variable, treating empty values as unset
fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let bearer_defaults = BearerConfig::default();

        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: parse_env("HTTP_PORT", 8081)?,
            keycloak: {
                let url = env::var("KEYCLOAK_URL")
                    .unwrap_or_else(|_| "http://localhost:8080".to_string())
                    .trim_end_matches('/')
                    .to_string();
                let public_url = optional_env("KEYCLOAK_PUBLIC_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| url.clone());

                KeycloakConfig {
                    url,
                    public_url,
                    realm: env::var("KEYCLOAK_REALM").unwrap_or_else(|_| "fersko".to_string()),
                    client_id: optional_env("KEYCLOAK_CLIENT_ID")
                        .context("KEYCLOAK_CLIENT_ID is required")?,
                    client_secret: optional_env("KEYCLOAK_CLIENT_SECRET"),
                    admin_realm: env::var("KEYCLOAK_ADMIN_REALM")
                        .unwrap_or_else(|_| "master".to_string()),
                    admin_client_id: env::var("KEYCLOAK_ADMIN_CLIENT_ID")
                        .unwrap_or_else(|_| "admin-cli".to_string()),
                    admin_client_secret: optional_env("KEYCLOAK_ADMIN_CLIENT_SECRET"),
                    admin_username: optional_env("KEYCLOAK_ADMIN"),
                    admin_password: optional_env("KEYCLOAK_ADMIN_PASSWORD"),
                    timeout_secs: parse_env("KEYCLOAK_TIMEOUT_SECS", 10)?,
                }
            },
            bearer: BearerConfig {
                issuer: optional_env("BEARER_ISSUER"),
                audiences: optional_env("BEARER_AUDIENCE")
                    .map(|s| {
                        s.split(',')
                            .map(|a| a.trim().to_string())
                            .filter(|a| !a.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                leeway_secs: parse_env("BEARER_LEEWAY_SECS", bearer_defaults.leeway_secs)?,
                jwks_cache_secs: parse_env(
                    "BEARER_JWKS_CACHE_SECS",
                    bearer_defaults.jwks_cache_secs,
                )?,
                jwks_min_refresh_secs: parse_env(
                    "BEARER_JWKS_MIN_REFRESH_SECS",
                    bearer_defaults.jwks_min_refresh_secs,
                )?,
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "auth-gateway".to_string()),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Issuer expected in bearer tokens
    pub fn expected_issuer(&self) -> String {
        self.bearer
            .issuer
            .clone()
            .unwrap_or_else(|| self.keycloak.issuer())
    }
}
