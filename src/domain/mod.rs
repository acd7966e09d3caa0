//! Domain models for the auth gateway

pub mod auth;

pub use auth::{
    AuthenticatedPrincipal, Credentials, RefreshTokenRequest, RegistrationRequest, TokenSet,
    UserProfile,
};
