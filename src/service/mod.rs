//! Business logic layer

pub mod credential;

pub use credential::CredentialService;
