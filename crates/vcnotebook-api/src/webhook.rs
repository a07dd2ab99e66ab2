//! Dodo Payments webhooks: Standard Webhooks signature checks and the event
//! union that drives premium activation.

use std::time::Duration;

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use crate::error::AppError;
use crate::subscriptions::SubscriptionUpdate;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADERS: [&str; 2] = ["webhook-signature", "x-webhook-signature"];
const ID_HEADER: &str = "webhook-id";
const TIMESTAMP_HEADER: &str = "webhook-timestamp";
const SECRET_PREFIX: &str = "whsec_";

/// Checks `v1,<base64>` signatures over `{id}.{timestamp}.{body}`.
pub struct SignatureVerifier {
    key: Vec<u8>,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SignatureVerifier")
            .field("key", &"[REDACTED]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl SignatureVerifier {
    /// `whsec_`-prefixed secrets are base64; anything else is used as raw bytes.
    pub fn new(secret: &str, tolerance: Duration) -> Self {
        let key = secret
            .strip_prefix(SECRET_PREFIX)
            .and_then(|encoded| STANDARD.decode(encoded).ok())
            .unwrap_or_else(|| secret.as_bytes().to_vec());
        Self { key, tolerance }
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<(), AppError> {
        let signatures = SIGNATURE_HEADERS
            .iter()
            .find_map(|name| headers.get(*name))
            .ok_or_else(|| AppError::bad_request("Missing webhook signature"))?
            .to_str()
            .map_err(|_| AppError::unauthorized("Webhook signature is not valid UTF-8"))?;

        let id = header_str(headers, ID_HEADER)?;
        let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
        let sent_at = timestamp
            .parse::<i64>()
            .map_err(|_| AppError::unauthorized("Webhook timestamp is not an integer"))?;
        if now.abs_diff(sent_at) > self.tolerance.as_secs() {
            return Err(AppError::unauthorized(
                "Webhook timestamp is outside the tolerance window",
            ));
        }

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| AppError::internal("Webhook secret cannot key HMAC"))?;
        mac.update(id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);

        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == "v1")
            .filter_map(|(_, encoded)| STANDARD.decode(encoded).ok())
            .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

        if matched {
            Ok(())
        } else {
            Err(AppError::unauthorized("Webhook signature mismatch"))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::unauthorized(format!("Missing `{name}` header")))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventCustomer {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMetadata {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventData {
    pub status: Option<String>,
    pub customer: Option<EventCustomer>,
    pub metadata: Option<EventMetadata>,
    pub subscription_id: Option<String>,
    pub payment_id: Option<String>,
    pub payload_type: Option<String>,
}

impl EventData {
    fn user_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.user_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    fn customer_email(&self) -> Option<String> {
        self.customer
            .as_ref()
            .and_then(|customer| customer.email.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: Option<String>,
    event: Option<String>,
    payload_type: Option<String>,
    #[serde(default)]
    data: Option<EventData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEnd {
    Cancelled,
    Expired,
    Failed,
}

/// A webhook body after one parse.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    PaymentSucceeded(EventData),
    SubscriptionActive(EventData),
    SubscriptionRenewed(EventData),
    SubscriptionEnded(SubscriptionEnd, EventData),
    /// Pre-envelope shapes (`event` or `payload_type` without `type`).
    Legacy(String),
    Unrecognized(String),
}

impl PaymentEvent {
    /// Fails only on bytes that are not JSON. JSON that does not fit the
    /// envelope is `Unrecognized`.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(body)?;
        let declared = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let envelope = match serde_json::from_value::<Envelope>(value) {
            Ok(envelope) => envelope,
            Err(error) => {
                tracing::debug!(event = declared.as_str(), "Webhook body has an unexpected shape: {error}");
                return Ok(Self::Unrecognized(declared));
            }
        };

        let Some(event_type) = envelope.event_type else {
            let legacy = envelope
                .event
                .or(envelope.payload_type)
                .or_else(|| envelope.data.and_then(|data| data.payload_type))
                .unwrap_or_else(|| "unknown".to_string());
            return Ok(Self::Legacy(legacy));
        };
        let Some(data) = envelope.data else {
            return Ok(Self::Unrecognized(event_type));
        };

        Ok(match event_type.as_str() {
            "payment.succeeded" => Self::PaymentSucceeded(data),
            "subscription.active" => Self::SubscriptionActive(data),
            "subscription.renewed" => Self::SubscriptionRenewed(data),
            "subscription.cancelled" => Self::SubscriptionEnded(SubscriptionEnd::Cancelled, data),
            "subscription.expired" => Self::SubscriptionEnded(SubscriptionEnd::Expired, data),
            "subscription.failed" => Self::SubscriptionEnded(SubscriptionEnd::Failed, data),
            _ => Self::Unrecognized(event_type),
        })
    }

    pub fn label(&self) -> &str {
        match self {
            Self::PaymentSucceeded(_) => "payment.succeeded",
            Self::SubscriptionActive(_) => "subscription.active",
            Self::SubscriptionRenewed(_) => "subscription.renewed",
            Self::SubscriptionEnded(SubscriptionEnd::Cancelled, _) => "subscription.cancelled",
            Self::SubscriptionEnded(SubscriptionEnd::Expired, _) => "subscription.expired",
            Self::SubscriptionEnded(SubscriptionEnd::Failed, _) => "subscription.failed",
            Self::Legacy(name) | Self::Unrecognized(name) => name,
        }
    }

    /// Premium state the event asks for, if it changes anything.
    pub fn premium_target(&self) -> Option<bool> {
        match self {
            // Only a settled payment activates; pending or processing ones are informational.
            Self::PaymentSucceeded(data) => data
                .status
                .as_deref()
                .filter(|status| status.eq_ignore_ascii_case("succeeded"))
                .map(|_| true),
            Self::SubscriptionActive(_) | Self::SubscriptionRenewed(_) => Some(true),
            Self::SubscriptionEnded(_, _) => Some(false),
            Self::Legacy(_) | Self::Unrecognized(_) => None,
        }
    }

    fn data(&self) -> Option<&EventData> {
        match self {
            Self::PaymentSucceeded(data)
            | Self::SubscriptionActive(data)
            | Self::SubscriptionRenewed(data)
            | Self::SubscriptionEnded(_, data) => Some(data),
            Self::Legacy(_) | Self::Unrecognized(_) => None,
        }
    }

    /// The row to write, or why nothing is written.
    pub fn subscription_update(&self) -> Result<SubscriptionUpdate, &'static str> {
        let is_premium = self
            .premium_target()
            .ok_or("event does not change premium state")?;
        let data = self.data().ok_or("event carries no data")?;
        let user_id = data.user_id().ok_or("event metadata has no user_id")?;

        let mut update = SubscriptionUpdate::new(user_id, is_premium);
        update.user_email = data.customer_email();
        update.subscription_id = data.subscription_id.clone();
        if matches!(self, Self::PaymentSucceeded(_)) {
            update.payment_id = data.payment_id.clone();
        }
        Ok(update)
    }
}

#[cfg(test)]
pub(crate) fn sign_for_test(secret: &str, id: &str, timestamp: i64, body: &[u8]) -> String {
    let verifier = SignatureVerifier::new(secret, Duration::from_secs(300));
    let mut mac = HmacSha256::new_from_slice(&verifier.key).unwrap();
    mac.update(format!("{id}.{timestamp}.").as_bytes());
    mac.update(body);
    format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes()))
}
