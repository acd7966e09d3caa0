//! Auth Gateway - credential façade in front of Keycloak
//!
//! This crate translates simple register/login/refresh/logout/profile requests
//! into Keycloak's admin and token-endpoint protocols, and guards protected
//! routes with stateless bearer-token verification against the realm's JWKS.

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod jwt;
pub mod keycloak;
pub mod middleware;
pub mod server;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
