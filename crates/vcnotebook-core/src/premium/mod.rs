//! Premium tier: subscription lookup and checkout through the proxy.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::SubscriptionStatus;
use crate::util::{compact_text, is_http_url, trim_base_url};

#[derive(Debug, Clone)]
pub struct PremiumClient {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    checkout_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyError {
    error: Option<String>,
    details: Option<String>,
}

impl PremiumClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = trim_base_url(base_url);
        if !is_http_url(&base_url) {
            return Err(Error::NotConfigured(format!(
                "API URL must include http:// or https://: {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            access_token: None,
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Send the identity token for proxies that require authentication.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = crate::util::normalize_text_option(Some(token.into()));
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn subscription_status(&self, user_id: &str) -> Result<SubscriptionStatus> {
        let user_id = require("userId", user_id)?;
        let request = self
            .client
            .get(format!("{}/api/user/subscription-status", self.base_url))
            .query(&[("userId", user_id)]);
        let response = self.authorize(request).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Ask the proxy for a hosted checkout page; returns its URL.
    pub async fn create_checkout(&self, email: &str, user_id: &str) -> Result<String> {
        let email = require("userEmail", email)?;
        let user_id = require("userId", user_id)?;
        let request = self
            .client
            .post(format!("{}/api/checkout/create", self.base_url))
            .json(&serde_json::json!({ "userEmail": email, "userId": user_id }));
        let response = self.authorize(request).send().await?;
        let payload: CheckoutResponse = check(response).await?.json().await?;
        payload
            .checkout_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::Api {
                status: 200,
                message: "Checkout response did not include a URL".to_string(),
            })
    }
}

fn require<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{field} is required")));
    }
    Ok(value)
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ProxyError>(&body) {
        Ok(ProxyError {
            error: Some(error),
            details: Some(details),
        }) => format!("{error}: {}", compact_text(&details)),
        Ok(ProxyError {
            error: Some(error), ..
        }) => error,
        _ => compact_text(&body),
    };
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized(message));
    }
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}
