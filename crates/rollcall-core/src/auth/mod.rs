//! Canvas API token handling.
//!
//! This module provides:
//! - `CredentialStore`: OS keychain storage via keyring
//! - `load_token`: resolves the token from the environment, a token file,
//!   or the keychain, in that order

pub mod credentials;
pub mod token;

pub use credentials::CredentialStore;
pub use token::{load_token, TokenSource, TOKEN_ENV_VAR};
