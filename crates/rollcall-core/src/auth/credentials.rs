use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "rollcall";

/// Canvas tokens in the OS keychain, one entry per API base URL.
pub struct CredentialStore;

impl CredentialStore {
    /// Store a token for a Canvas instance in the OS keychain
    pub fn store(base_url: &str, token: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, base_url)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(token)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    /// Retrieve the token for a Canvas instance from the OS keychain
    pub fn get_token(base_url: &str) -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, base_url)
            .context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve token from keychain")
    }

    /// Delete the stored token for a Canvas instance
    pub fn delete(base_url: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, base_url)
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete token from keychain")?;
        Ok(())
    }

    pub fn has_token(base_url: &str) -> bool {
        Self::get_token(base_url).is_ok()
    }
}
