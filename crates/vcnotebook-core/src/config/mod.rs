//! Client configuration served by the proxy.
//!
//! Clients never ship backend keys; they ask the proxy for them at startup.
//! Any failure here means the session runs offline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::ensure_success;
use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option, trim_base_url};

/// Proxy address used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Backend coordinates from `GET /api/config`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub supabase_service_key: Option<String>,
}

impl BackendConfig {
    /// URL and anonymous key, when both are present and the URL is usable.
    pub fn credentials(&self) -> Option<(String, String)> {
        let url = normalize_text_option(self.supabase_url.clone())?;
        let anon_key = normalize_text_option(self.supabase_anon_key.clone())?;
        is_http_url(&url).then_some((url, anon_key))
    }

    pub fn is_usable(&self) -> bool {
        self.credentials().is_some()
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BackendConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &self.supabase_anon_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "supabase_service_key",
                &self.supabase_service_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Identity provider settings from `GET /api/firebase-config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub auth_domain: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub storage_bucket: Option<String>,
    #[serde(default)]
    pub messaging_sender_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

impl FirebaseConfig {
    /// Sign-in needs the API key; the domain and project identify the tenant.
    pub fn is_usable(&self) -> bool {
        [&self.api_key, &self.auth_domain, &self.project_id]
            .into_iter()
            .all(|value| normalize_text_option(value.clone()).is_some())
    }
}

/// Analytics switch from `GET /api/ga-config`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub measurement_id: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

/// Reads client configuration from the proxy.
#[derive(Debug, Clone)]
pub struct ServerConfigClient {
    base_url: String,
    client: reqwest::Client,
}

impl ServerConfigClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = trim_base_url(base_url);
        if !is_http_url(&base_url) {
            return Err(Error::NotConfigured(format!(
                "API URL must include http:// or https://: {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn backend_config(&self) -> Result<BackendConfig> {
        self.get_json("/api/config").await
    }

    pub async fn firebase_config(&self) -> Result<FirebaseConfig> {
        self.get_json("/api/firebase-config").await
    }

    pub async fn analytics_config(&self) -> Result<AnalyticsConfig> {
        self.get_json("/api/ga-config").await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(ensure_success(response).await?.json::<T>().await?)
    }
}
