//! Server initialization and routing

use crate::api;
use crate::config::Config;
use crate::jwt::JwksVerifier;
use crate::keycloak::{IdentityProvider, KeycloakClient};
use crate::middleware::{
    normalize_error_response, require_auth_middleware, AuthMiddlewareState, SanitizedMakeSpan,
};
use crate::service::CredentialService;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub credential_service: Arc<CredentialService>,
    pub bearer_verifier: JwksVerifier,
}

impl AppState {
    /// Wire the services for `config` on top of an identity provider
    pub fn new(config: &Config, provider: Arc<dyn IdentityProvider>) -> Result<Self> {
        let bearer_verifier =
            JwksVerifier::from_config(config).context("Failed to create bearer verifier")?;

        Ok(Self {
            credential_service: Arc::new(CredentialService::new(provider)),
            bearer_verifier,
        })
    }

    /// State backed by the configured Keycloak realm
    pub fn from_config(config: Config) -> Result<Self> {
        let keycloak =
            KeycloakClient::new(config.keycloak.clone()).context("Failed to create Keycloak client")?;
        info!("Keycloak client ready for realm '{}'", keycloak.realm());
        Self::new(&config, Arc::new(keycloak))
    }
}

/// Run the HTTP server until Ctrl-C or SIGTERM
pub async fn run(config: Config) -> Result<()> {
    let http_addr = config.http_addr();
    let state = AppState::from_config(config)?;
    let app = build_router(state);

    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", http_addr))?;
    info!("HTTP server started on {}", http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Build the HTTP router
///
/// Layers, outermost first: CORS, request tracing, error normalization,
/// bearer gate. Preflight requests are answered by the CORS layer and never
/// reach the gate.
pub fn build_router(state: AppState) -> Router {
    // Bearer tokens only, no cookies, so any origin may call
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_state = AuthMiddlewareState::new(state.bearer_verifier.clone());

    Router::new()
        .route("/actuator/health", get(api::health::health))
        .route("/actuator/info", get(api::health::info))
        .route("/api/v1/auth/register", post(api::auth::register))
        .route("/api/v1/auth/login", post(api::auth::login))
        .route("/api/v1/auth/refresh", post(api::auth::refresh))
        .route("/api/v1/auth/logout", post(api::auth::logout))
        .route("/api/v1/auth/me", get(api::auth::me))
        .fallback(api::fallback)
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            require_auth_middleware,
        ))
        .layer(axum::middleware::from_fn(normalize_error_response))
        .layer(TraceLayer::new_for_http().make_span_with(SanitizedMakeSpan))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
