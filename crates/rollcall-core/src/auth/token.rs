use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::CredentialStore;
use crate::config::Config;

/// Environment variable checked first for a Canvas token
pub const TOKEN_ENV_VAR: &str = "ROLLCALL_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    File(PathBuf),
    Keychain,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Environment => write!(f, "${}", TOKEN_ENV_VAR),
            TokenSource::File(path) => write!(f, "{}", path.display()),
            TokenSource::Keychain => write!(f, "OS keychain"),
        }
    }
}

/// Find the Canvas token for `config`: environment first, then the
/// configured token file, then the OS keychain.
pub fn load_token(config: &Config) -> Result<(String, TokenSource)> {
    resolve_token(std::env::var(TOKEN_ENV_VAR).ok(), config, || {
        CredentialStore::get_token(&config.base_url)
    })
}

fn resolve_token<F>(env_token: Option<String>, config: &Config, keychain: F) -> Result<(String, TokenSource)>
where
    F: FnOnce() -> Result<String>,
{
    if let Some(token) = env_token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        debug!("Using token from environment");
        return Ok((token, TokenSource::Environment));
    }

    if let Some(ref path) = config.token_path {
        let token = read_token_file(path)?;
        debug!(path = %path.display(), "Using token from file");
        return Ok((token, TokenSource::File(path.clone())));
    }

    let token = keychain().with_context(|| {
        format!(
            "No Canvas token found: set {}, configure token_path, or run `rollcall token set`",
            TOKEN_ENV_VAR
        )
    })?;
    debug!("Using token from keychain");
    Ok((token, TokenSource::Keychain))
}

/// Read a token file, ignoring surrounding whitespace.
pub fn read_token_file(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file {}", path.display()))?;
    let token = contents.trim();
    if token.is_empty() {
        anyhow::bail!("Token file {} is empty", path.display());
    }
    Ok(token.to_string())
}
