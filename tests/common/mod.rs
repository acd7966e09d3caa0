//! Common test utilities
//!
//! A wiremock server stands in for Keycloak (admin API, token endpoint and
//! JWKS). Access tokens are signed locally with fixture RSA keys whose public
//! halves are served from the mock JWKS endpoint.

#![allow(dead_code)]

use auth_gateway::config::{BearerConfig, Config, KeycloakConfig, TelemetryConfig};
use auth_gateway::server::{build_router, AppState};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use lazy_static::lazy_static;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REALM: &str = "test";
pub const CLIENT_ID: &str = "auth-gateway";
pub const CLIENT_SECRET: &str = "gateway-secret";
pub const ADMIN_TOKEN: &str = "mock-admin-token";

/// RSA key pair used to sign test access tokens
pub struct TestKey {
    pub kid: &'static str,
    encoding_key: EncodingKey,
    n: String,
    e: String,
}

impl TestKey {
    fn from_pem(kid: &'static str, pem: &str) -> Self {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem).expect("fixture key is PKCS#8 RSA");
        let der = private_key
            .to_pkcs1_der()
            .expect("fixture key encodes as PKCS#1");
        let public_key = private_key.to_public_key();

        Self {
            kid,
            encoding_key: EncodingKey::from_rsa_der(der.as_bytes()),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    /// Public JWK as published by the realm's certs endpoint
    pub fn jwk(&self) -> Value {
        json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.n,
            "e": self.e,
        })
    }

    /// Sign `claims` with this key, advertising `kid` in the header
    pub fn sign_with_kid(&self, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding_key).expect("failed to sign test token")
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_kid(self.kid, claims)
    }
}

lazy_static! {
    pub static ref SIGNING_KEY: TestKey =
        TestKey::from_pem("signing-key", include_str!("../fixtures/signing_key.pem"));
    pub static ref ROTATED_KEY: TestKey =
        TestKey::from_pem("rotated-key", include_str!("../fixtures/rotated_key.pem"));
}

/// Issuer Keycloak would put into tokens for the mock realm
pub fn issuer(base_url: &str) -> String {
    format!("{}/realms/{}", base_url, REALM)
}

/// Claims of a valid access token for `sub`
pub fn access_claims(base_url: &str, sub: &str) -> Value {
    let now = chrono::Utc::now().timestamp();
    json!({
        "iss": issuer(base_url),
        "sub": sub,
        "aud": "account",
        "azp": CLIENT_ID,
        "typ": "Bearer",
        "iat": now,
        "nbf": now,
        "exp": now + 300,
        "email": "ada@example.com",
        "preferred_username": "ada@example.com",
    })
}

pub fn test_keycloak_config(base_url: &str) -> KeycloakConfig {
    KeycloakConfig {
        url: base_url.to_string(),
        public_url: base_url.to_string(),
        realm: REALM.to_string(),
        client_id: CLIENT_ID.to_string(),
        client_secret: Some(CLIENT_SECRET.to_string()),
        admin_realm: "master".to_string(),
        admin_client_id: "admin-cli".to_string(),
        admin_client_secret: None,
        admin_username: Some("admin".to_string()),
        admin_password: Some("admin-password".to_string()),
        timeout_secs: 5,
    }
}

pub fn test_config(base_url: &str) -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        keycloak: test_keycloak_config(base_url),
        bearer: BearerConfig {
            jwks_min_refresh_secs: 0,
            ..BearerConfig::default()
        },
        telemetry: TelemetryConfig::default(),
    }
}

/// Router wired to the mock Keycloak exactly as in production
pub fn build_app(config: Config) -> Router {
    let state = AppState::from_config(config).expect("failed to build app state");
    build_router(state)
}

/// Mock Keycloak server for testing
pub struct MockKeycloak {
    pub server: MockServer,
}

impl MockKeycloak {
    /// Start a mock server with the admin token endpoint mounted
    pub async fn start() -> Self {
        let mock = Self {
            server: MockServer::start().await,
        };
        mock.mock_admin_token().await;
        mock
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn app(&self) -> Router {
        build_app(test_config(&self.uri()))
    }

    async fn mock_admin_token(&self) {
        Mock::given(method("POST"))
            .and(path("/realms/master/protocol/openid-connect/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": ADMIN_TOKEN,
                "expires_in": 300,
                "token_type": "Bearer"
            })))
            .mount(&self.server)
            .await;
    }

    fn users_path() -> String {
        format!("/admin/realms/{}/users", REALM)
    }

    fn user_path(user_id: &str) -> String {
        format!("/admin/realms/{}/users/{}", REALM, user_id)
    }

    fn token_path() -> String {
        format!("/realms/{}/protocol/openid-connect/token", REALM)
    }

    /// Search by email answering with `users`. `times` limits how often this
    /// answer is served before later mounts take over.
    pub async fn mock_search_users(&self, email: &str, users: Value, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(Self::users_path()))
            .and(query_param("email", email))
            .and(query_param("exact", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(users));
        match times {
            Some(n) => mock.up_to_n_times(n).mount(&self.server).await,
            None => mock.mount(&self.server).await,
        }
    }

    pub async fn mock_create_user(&self, user_id: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(Self::users_path()))
            .respond_with(ResponseTemplate::new(201).append_header(
                "Location",
                format!("{}{}", self.uri(), Self::user_path(user_id)),
            ))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_reset_password(&self, user_id: &str, status: u16) {
        Mock::given(method("PUT"))
            .and(path(format!("{}/reset-password", Self::user_path(user_id))))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_delete_user(&self, user_id: &str, expected_calls: u64) {
        Mock::given(method("DELETE"))
            .and(path(Self::user_path(user_id)))
            .respond_with(ResponseTemplate::new(204))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_get_user(&self, user_id: &str, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path(Self::user_path(user_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_json(user_id)))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_password_grant(&self, access_token: &str, refresh_token: &str) {
        Mock::given(method("POST"))
            .and(path(Self::token_path()))
            .and(body_string_contains("grant_type=password"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(token_json(access_token, refresh_token)),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_password_grant_rejected(&self) {
        Mock::given(method("POST"))
            .and(path(Self::token_path()))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid user credentials"
            })))
            .mount(&self.server)
            .await;
    }

    /// Refresh grant for `refresh_token` answering with a new token pair
    pub async fn mock_refresh_grant(
        &self,
        refresh_token: &str,
        access_token: &str,
        new_refresh_token: &str,
    ) {
        Mock::given(method("POST"))
            .and(path(Self::token_path()))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={}", refresh_token)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_json(access_token, new_refresh_token)),
            )
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Any refresh grant is rejected as Keycloak does for revoked sessions
    pub async fn mock_refresh_grant_rejected(&self) {
        Mock::given(method("POST"))
            .and(path(Self::token_path()))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Session not active"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_logout(&self, status: u16, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/realms/{}/protocol/openid-connect/logout", REALM)))
            .respond_with(ResponseTemplate::new(status))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// JWKS endpoint publishing `keys`, served at most `times` times if given
    pub async fn mock_jwks(&self, keys: &[&TestKey], times: Option<u64>) {
        let body = json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() });
        let mock = Mock::given(method("GET"))
            .and(path(format!("/realms/{}/protocol/openid-connect/certs", REALM)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body));
        match times {
            Some(n) => mock.up_to_n_times(n).mount(&self.server).await,
            None => mock.mount(&self.server).await,
        }
    }
}

pub fn user_json(user_id: &str) -> Value {
    json!({
        "id": user_id,
        "username": "ada@example.com",
        "email": "ada@example.com",
        "firstName": "Ada",
        "lastName": "Lovelace",
        "enabled": true,
        "emailVerified": false,
        "createdTimestamp": 1700000000000u64
    })
}

pub fn token_json(access_token: &str, refresh_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "Bearer",
        "expires_in": 300,
        "refresh_expires_in": 1800,
        "scope": "openid email profile",
        "session_state": "f0f1"
    })
}

pub fn registration_body(email: &str) -> Value {
    json!({
        "email": email,
        "password": "correct-horse",
        "firstName": "Ada",
        "lastName": "Lovelace"
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn post_json(app: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

pub async fn post_raw(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn get_json(app: &Router, uri: &str, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}
