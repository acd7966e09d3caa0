//! Keycloak integration
//!
//! [`KeycloakClient`] talks to two surfaces of the same Keycloak server: the
//! admin REST API for directory operations and the realm's OpenID Connect
//! token endpoint for grants and logout. The rest of the crate only sees the
//! [`IdentityProvider`] trait.

mod client;
mod provider;
mod token;
mod types;

pub use client::KeycloakClient;
pub use provider::{DirectoryUser, IdentityProvider, NewDirectoryUser, TokenGrant};

#[cfg(test)]
pub use provider::MockIdentityProvider;
