//! Firebase session helpers with secure keychain persistence.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;
use vcnotebook_core::auth::{AuthResult, FirebaseAuthClient, SessionPersistence};
pub use vcnotebook_core::auth::{AuthError, AuthSession};
use vcnotebook_core::config::ServerConfigClient;
use vcnotebook_core::util::trim_base_url;

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "vcnotebook-cli";

/// One keychain entry per proxy, so sessions for different deployments never mix.
#[derive(Clone)]
pub struct SessionStore {
    username: String,
}

impl SessionStore {
    pub fn for_api(api_url: &str) -> Self {
        Self {
            username: format!("firebase_session:{}", trim_base_url(api_url)),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl SessionPersistence for SessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard
            .get(&self.username)
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(AuthError::from)
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> AuthResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Sign-in against the identity provider configured on the proxy.
#[derive(Clone)]
pub struct FirebaseAuthService {
    inner: FirebaseAuthClient<SessionStore>,
}

impl FirebaseAuthService {
    /// Fetch the public Firebase settings from the proxy and build a client
    /// whose sessions live in the keychain entry for `api_url`.
    pub async fn connect(api_url: &str, auth_url: Option<&str>) -> Result<Self, CliError> {
        let firebase = ServerConfigClient::new(api_url)?.firebase_config().await?;
        let api_key = firebase
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(AuthError::NotConfigured)?;
        let client = FirebaseAuthClient::new(api_key, SessionStore::for_api(api_url))?;
        let client = match auth_url {
            Some(url) => client.with_base_url(url),
            None => client,
        };
        Ok(Self { inner: client })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.inner.sign_in(email, password).await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.inner.sign_up(email, password).await
    }

    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        self.inner.restore_session().await
    }
}

/// Stored session as-is, without contacting the identity provider.
pub fn load_stored_session(api_url: &str) -> AuthResult<Option<AuthSession>> {
    SessionStore::for_api(api_url).load_session()
}

pub fn clear_stored_session(api_url: &str) -> AuthResult<()> {
    SessionStore::for_api(api_url).clear_session()
}
