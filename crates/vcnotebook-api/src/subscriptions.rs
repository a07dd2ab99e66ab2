use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";

const TABLE: &str = "user_subscriptions";

/// Premium state of one user as served by `/api/user/subscription-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default = "inactive_status")]
    pub subscription_status: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn inactive() -> Self {
        Self {
            is_premium: false,
            subscription_status: STATUS_INACTIVE.to_string(),
            updated_at: None,
        }
    }
}

fn inactive_status() -> String {
    STATUS_INACTIVE.to_string()
}

/// Row written when a payment event changes a user's premium state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionUpdate {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub is_premium: bool,
    pub subscription_status: &'static str,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

impl SubscriptionUpdate {
    pub fn new(user_id: impl Into<String>, is_premium: bool) -> Self {
        Self {
            user_id: user_id.into(),
            user_email: None,
            is_premium,
            subscription_status: if is_premium {
                STATUS_ACTIVE
            } else {
                STATUS_INACTIVE
            },
            updated_at: Utc::now(),
            subscription_id: None,
            payment_id: None,
        }
    }
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Result<Option<SubscriptionRecord>, AppError>;

    /// Insert or replace the row keyed by `user_id`.
    async fn upsert(&self, update: &SubscriptionUpdate) -> Result<(), AppError>;
}

/// `user_subscriptions` table behind PostgREST, using the service-role key.
pub struct SupabaseSubscriptionStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl std::fmt::Debug for SupabaseSubscriptionStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseSubscriptionStore")
            .field("base_url", &self.base_url)
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}

impl SupabaseSubscriptionStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let url = config.supabase_url.as_deref()?;
        let key = config.supabase_service_role_key.as_deref()?;
        Some(Self::new(url, key))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{TABLE}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

#[async_trait]
impl SubscriptionStore for SupabaseSubscriptionStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<SubscriptionRecord>, AppError> {
        let response = self
            .request(reqwest::Method::GET, &self.table_url())
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                (
                    "select",
                    "is_premium,subscription_status,updated_at".to_string(),
                ),
                ("limit", "1".to_string()),
            ])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| {
                AppError::external(format!("Subscription lookup failed: {}", sanitize(&error)))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(format!(
                "Subscription lookup failed with HTTP {status}: {}",
                compact_body(&body)
            )));
        }

        let rows = response
            .json::<Vec<SubscriptionRecord>>()
            .await
            .map_err(|error| {
                AppError::external(format!("Subscription parse failed: {}", sanitize(&error)))
            })?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, update: &SubscriptionUpdate) -> Result<(), AppError> {
        let url = format!("{}?on_conflict=user_id", self.table_url());
        let response = self
            .request(reqwest::Method::POST, &url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(update)
            .send()
            .await
            .map_err(|error| {
                AppError::external(format!("Subscription upsert failed: {}", sanitize(&error)))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(format!(
                "Subscription upsert failed with HTTP {status}: {}",
                compact_body(&body)
            )));
        }
        Ok(())
    }
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

fn compact_body(body: &str) -> String {
    body.trim().chars().take(180).collect()
}
