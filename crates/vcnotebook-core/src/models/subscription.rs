//! Premium subscription status as reported by the proxy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";

/// Read-only view of a user's subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default = "inactive")]
    pub subscription_status: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self {
            is_premium: false,
            subscription_status: inactive(),
            updated_at: None,
        }
    }
}

impl SubscriptionStatus {
    /// Label shown next to the account.
    pub const fn badge(&self) -> &'static str {
        if self.is_premium {
            "Premium"
        } else {
            "Free"
        }
    }
}

fn inactive() -> String {
    STATUS_INACTIVE.to_string()
}
