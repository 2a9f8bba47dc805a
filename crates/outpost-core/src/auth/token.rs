use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "outpost";

/// Keychain account under which the API token is stored.
const TOKEN_ACCOUNT: &str = "api-token";

pub struct TokenStore;

impl TokenStore {
    /// Store the API bearer token in the OS keychain
    pub fn store(token: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_ACCOUNT)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(token)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    /// Retrieve the stored token, if any
    pub fn load() -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_ACCOUNT)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    /// Delete the stored token. Deleting a missing token is not an error.
    pub fn delete() -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_ACCOUNT)
            .context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
