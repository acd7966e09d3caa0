//! Bearer token verification against the realm's published signing keys
//!
//! Tokens are issued by Keycloak; this module only verifies them. Keys come
//! from the realm JWKS endpoint and are cached for a configurable TTL. A token
//! signed with a key id the cache has never seen forces one refresh, which is
//! how key rotation is picked up before the TTL runs out.

use crate::config::{BearerConfig, Config};
use crate::domain::AuthenticatedPrincipal;
use jsonwebtoken::jwk::{Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Asymmetric algorithms Keycloak realms sign access tokens with
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::PS256,
];

/// Reasons a bearer token is rejected
#[derive(Debug, Error)]
pub enum BearerError {
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("token header has no key id")]
    MissingKeyId,
    #[error("signing key not found")]
    KeyNotFound,
    #[error("signing keys unavailable: {0}")]
    JwksUnavailable(String),
    #[error("token has an empty subject")]
    MissingSubject,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Claims read from a verified access token
#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedJwks {
    keys: Vec<Jwk>,
    fetched_at: Instant,
}

/// Stateless bearer token verifier with a process-wide JWKS cache
#[derive(Clone)]
pub struct JwksVerifier {
    http_client: reqwest::Client,
    jwks_url: String,
    issuer: String,
    audiences: Vec<String>,
    leeway_secs: u64,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    last_fetch_attempt: Arc<RwLock<Option<Instant>>>,
}

impl JwksVerifier {
    pub fn new(
        jwks_url: impl Into<String>,
        issuer: impl Into<String>,
        bearer: &BearerConfig,
        timeout: Duration,
    ) -> Result<Self, BearerError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BearerError::JwksUnavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            jwks_url: jwks_url.into(),
            issuer: issuer.into(),
            audiences: bearer.audiences.clone(),
            leeway_secs: bearer.leeway_secs,
            cache_ttl: Duration::from_secs(bearer.jwks_cache_secs),
            min_refresh_interval: Duration::from_secs(bearer.jwks_min_refresh_secs),
            cache: Arc::new(RwLock::new(None)),
            last_fetch_attempt: Arc::new(RwLock::new(None)),
        })
    }

    /// Build a verifier for the configured realm
    pub fn from_config(config: &Config) -> Result<Self, BearerError> {
        Self::new(
            config.keycloak.certs_url(),
            config.expected_issuer(),
            &config.bearer,
            Duration::from_secs(config.keycloak.timeout_secs),
        )
    }

    /// Verify a bearer token and extract the caller's identity
    pub async fn verify(&self, token: &str) -> Result<AuthenticatedPrincipal, BearerError> {
        let header = decode_header(token)?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(BearerError::UnsupportedAlgorithm);
        }
        let kid = header.kid.as_deref().ok_or(BearerError::MissingKeyId)?;

        let jwk = self.signing_key(kid).await?;
        if let Some(key_alg) = &jwk.common.key_algorithm {
            if signing_algorithm(key_alg) != Some(header.alg) {
                return Err(BearerError::UnsupportedAlgorithm);
            }
        }
        let decoding_key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        if self.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audiences);
        }
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let claims = decode::<AccessTokenClaims>(token, &decoding_key, &validation)?.claims;
        if claims.sub.is_empty() {
            return Err(BearerError::MissingSubject);
        }

        Ok(AuthenticatedPrincipal {
            subject: claims.sub,
            email: claims.email,
            username: claims.preferred_username,
        })
    }

    /// Find the key for `kid`, refreshing the cache when it has expired or
    /// when the key id is unknown. Fetches, failed ones included, are at least
    /// `min_refresh_interval` apart; in between a stale key keeps being used.
    async fn signing_key(&self, kid: &str) -> Result<Jwk, BearerError> {
        let (cached_key, fresh, has_cache) = {
            let cache = self.cache.read().await;
            match &*cache {
                Some(entry) => (
                    find_key(&entry.keys, kid).cloned(),
                    entry.fetched_at.elapsed() < self.cache_ttl,
                    true,
                ),
                None => (None, false, false),
            }
        };

        match (cached_key, fresh) {
            (Some(key), true) => Ok(key),
            (Some(stale), false) => {
                if !self.fetch_allowed().await {
                    return Ok(stale);
                }
                match self.refresh().await {
                    Ok(keys) => find_key(&keys, kid).cloned().ok_or(BearerError::KeyNotFound),
                    Err(e) => {
                        warn!("JWKS refresh failed, using cached key: {}", e);
                        Ok(stale)
                    }
                }
            }
            (None, _) => {
                if !self.fetch_allowed().await {
                    return Err(if has_cache {
                        BearerError::KeyNotFound
                    } else {
                        BearerError::JwksUnavailable("JWKS fetch recently failed".to_string())
                    });
                }
                debug!(kid = %kid, "Unknown signing key id, refreshing JWKS");
                let keys = self.refresh().await?;
                find_key(&keys, kid).cloned().ok_or(BearerError::KeyNotFound)
            }
        }
    }

    async fn fetch_allowed(&self) -> bool {
        match *self.last_fetch_attempt.read().await {
            Some(at) => at.elapsed() >= self.min_refresh_interval,
            None => true,
        }
    }

    async fn refresh(&self) -> Result<Vec<Jwk>, BearerError> {
        *self.last_fetch_attempt.write().await = Some(Instant::now());

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| BearerError::JwksUnavailable(format!("Failed to fetch JWKS: {}", e)))?;

        if !response.status().is_success() {
            return Err(BearerError::JwksUnavailable(format!(
                "Failed to fetch JWKS: {}",
                response.status()
            )));
        }

        let document: Value = response
            .json()
            .await
            .map_err(|e| BearerError::JwksUnavailable(format!("Failed to parse JWKS: {}", e)))?;
        let keys = signing_keys(&document);

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        debug!(count = keys.len(), "Refreshed JWKS");

        Ok(keys)
    }
}

/// Signature algorithm a JWK is bound to; `None` for non-signing algorithms
fn signing_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

fn find_key<'a>(keys: &'a [Jwk], kid: &str) -> Option<&'a Jwk> {
    keys.iter()
        .find(|key| key.common.key_id.as_deref() == Some(kid))
}

/// Keys usable for signature verification. Entries the JWK model cannot
/// represent and encryption keys are skipped rather than failing the set.
fn signing_keys(document: &Value) -> Vec<Jwk> {
    document
        .get("keys")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(|key| serde_json::from_value::<Jwk>(key.clone()).ok())
                .filter(|jwk| {
                    matches!(
                        jwk.common.public_key_use,
                        None | Some(PublicKeyUse::Signature)
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}
