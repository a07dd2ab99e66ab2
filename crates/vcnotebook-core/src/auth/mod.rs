//! Firebase Auth REST client.

use std::fmt;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{normalize_text_option, trim_base_url};

const EXPIRY_SKEW_SECONDS: i64 = 60;
const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= chrono::Utc::now().timestamp() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Firebase auth is not configured on the server.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Where signed-in sessions are kept between runs.
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

#[derive(Clone)]
pub struct FirebaseAuthClient<S: SessionPersistence> {
    api_key: String,
    identity_url: String,
    token_url: String,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> FirebaseAuthClient<S> {
    pub fn new(api_key: impl Into<String>, store: S) -> AuthResult<Self> {
        let api_key = normalize_text_option(Some(api_key.into()))
            .ok_or(AuthError::InvalidConfiguration("Firebase API key must not be empty"))?;

        Ok(Self {
            api_key,
            identity_url: IDENTITY_TOOLKIT_URL.to_string(),
            token_url: SECURE_TOKEN_URL.to_string(),
            client: Client::builder().build()?,
            store,
        })
    }

    /// Point both Firebase REST services at another host (emulator or tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base_url = trim_base_url(base_url);
        self.identity_url.clone_from(&base_url);
        self.token_url = base_url;
        self
    }

    /// Load the persisted session, refreshing it when close to expiry. A
    /// session that cannot be refreshed is discarded.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session.refresh_token).await {
            Ok(mut refreshed) => {
                if refreshed.user.email.is_none() {
                    refreshed.user.email = stored_session.user.email;
                }
                self.store.save_session(&refreshed)?;
                Ok(Some(refreshed))
            }
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.password_request("accounts:signInWithPassword", email, password)
            .await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.password_request("accounts:signUp", email, password)
            .await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty",
            ));
        }

        let response = self
            .client
            .post(format!("{}/v1/token", self.token_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await?;
        let payload: RefreshResponse = parse_response(response).await?;
        let session = payload.into_session()?;
        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Firebase ID tokens cannot be revoked over REST; signing out forgets
    /// the local session.
    pub fn sign_out(&self) -> AuthResult<()> {
        self.store.clear_session()
    }

    async fn password_request(
        &self,
        endpoint: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let response = self
            .client
            .post(format!("{}/v1/{endpoint}", self.identity_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({
                "email": email.trim(),
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;
        let payload: PasswordResponse = parse_response(response).await?;
        let session = payload.into_session()?;
        self.store.save_session(&session)?;
        Ok(session)
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::Api("Email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(AuthError::Api("Password is required".to_string()));
    }
    Ok(())
}

async fn parse_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> AuthResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AuthError::Api(parse_api_error(status, &body)));
    }
    Ok(serde_json::from_str(&body)?)
}

fn expires_at(expires_in: &str) -> AuthResult<i64> {
    let seconds: i64 = expires_in
        .trim()
        .parse()
        .map_err(|_| AuthError::Api(format!("Invalid expiresIn value: {expires_in}")))?;
    Ok(chrono::Utc::now().timestamp().saturating_add(seconds))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
}

impl PasswordResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        Ok(AuthSession {
            expires_at: expires_at(&self.expires_in)?,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            user: AuthUser {
                id: self.local_id,
                email: self.email,
                display_name: normalize_text_option(self.display_name),
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

impl RefreshResponse {
    fn into_session(self) -> AuthResult<AuthSession> {
        Ok(AuthSession {
            expires_at: expires_at(&self.expires_in)?,
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            user: AuthUser {
                id: self.user_id,
                email: None,
                display_name: None,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorResponse {
    error: FirebaseErrorBody,
}

#[derive(Debug, Deserialize)]
struct FirebaseErrorBody {
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<FirebaseErrorResponse>(body) {
        if let Some(message) = payload.error.message {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", crate::util::compact_text(trimmed), status.as_u16())
    }
}
