use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;

pub const PREMIUM_PRODUCT_TAG: &str = "premium_upgrade";

/// Creates hosted checkout sessions with Dodo Payments.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    client: reqwest::Client,
    config: Arc<AppConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub checkout_url: String,
}

#[derive(Debug, Serialize)]
struct CheckoutPayload<'a> {
    payment_link: bool,
    billing: Billing,
    customer: Customer<'a>,
    product_cart: [CartItem<'a>; 1],
    return_url: String,
    success_url: String,
    cancel_url: String,
    metadata: CheckoutMetadata<'a>,
}

/// Dodo requires a billing address up front; the hosted page lets the
/// customer replace it.
#[derive(Debug, Serialize)]
struct Billing {
    city: &'static str,
    country: &'static str,
    state: &'static str,
    street: &'static str,
    zipcode: &'static str,
}

impl Billing {
    const PLACEHOLDER: Self = Self {
        city: "New York",
        country: "US",
        state: "NY",
        street: "123 Main St",
        zipcode: "10001",
    };
}

#[derive(Debug, Serialize)]
struct Customer<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CartItem<'a> {
    product_id: &'a str,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct CheckoutMetadata<'a> {
    user_id: &'a str,
    user_email: &'a str,
    product: &'static str,
}

#[derive(Debug, Deserialize)]
struct DodoCheckoutResponse {
    payment_url: Option<String>,
    checkout_url: Option<String>,
    url: Option<String>,
}

impl CheckoutService {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// `origin` is the public scheme and host used for the return URLs.
    pub async fn create_checkout(
        &self,
        user_email: &str,
        user_id: &str,
        origin: &str,
    ) -> Result<CheckoutSession, AppError> {
        let api_key = self.config.dodo_api_key.as_deref().ok_or_else(|| {
            AppError::not_configured(
                "Payment system not configured",
                "DODO_PAYMENTS_API_KEY environment variable is missing",
            )
        })?;
        let product_id = self.config.dodo_product_id.as_deref().ok_or_else(|| {
            AppError::not_configured(
                "Product not configured",
                "PRODUCT_ID environment variable is missing",
            )
        })?;

        let origin = origin.trim_end_matches('/');
        let payload = CheckoutPayload {
            payment_link: true,
            billing: Billing::PLACEHOLDER,
            customer: Customer {
                email: user_email,
                name: customer_name(user_email),
            },
            product_cart: [CartItem {
                product_id,
                quantity: 1,
            }],
            return_url: format!("{origin}/"),
            success_url: format!("{origin}/payment-success"),
            cancel_url: format!("{origin}/"),
            metadata: CheckoutMetadata {
                user_id,
                user_email,
                product: PREMIUM_PRODUCT_TAG,
            },
        };

        let request_url = format!("{}/checkouts", self.config.dodo_api_base_url);
        let response = self
            .client
            .post(&request_url)
            .bearer_auth(api_key)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                AppError::external(format!("Checkout request failed: {}", sanitize(&error)))
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let details = response.text().await.unwrap_or_default();
            tracing::warn!(status, "Payment provider rejected checkout creation");
            return Err(AppError::Upstream {
                error: "Failed to create checkout".to_string(),
                details: compact_body(&details),
                status,
            });
        }

        let body = response
            .json::<DodoCheckoutResponse>()
            .await
            .map_err(|error| {
                AppError::external(format!("Checkout response parse failed: {}", sanitize(&error)))
            })?;

        let checkout_url = body
            .payment_url
            .or(body.checkout_url)
            .or(body.url)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::external("Payment provider returned no checkout URL"))?;

        Ok(CheckoutSession { checkout_url })
    }
}

/// The local part of the address, or the whole address when it has none.
fn customer_name(email: &str) -> &str {
    email
        .split_once('@')
        .map_or(email, |(local, _)| local)
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

fn compact_body(body: &str) -> String {
    body.trim().chars().take(500).collect()
}
