use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DODO_API_BASE_URL: &str = "https://test.dodopayments.com";
pub const DEFAULT_FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings for the proxy. Every integration is optional; routes
/// whose integration is absent answer with a configuration error instead.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub public_base_url: Option<String>,
    pub static_dir: Option<PathBuf>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub supabase_service_role_key: Option<String>,
    pub expose_service_role_key: bool,
    pub firebase_api_key: Option<String>,
    pub firebase_auth_domain: Option<String>,
    pub firebase_project_id: Option<String>,
    pub firebase_storage_bucket: Option<String>,
    pub firebase_messaging_sender_id: Option<String>,
    pub firebase_app_id: Option<String>,
    pub ga_measurement_id: Option<String>,
    pub dodo_api_key: Option<String>,
    pub dodo_product_id: Option<String>,
    pub dodo_api_base_url: String,
    pub dodo_webhook_secret: Option<String>,
    pub webhook_tolerance: Duration,
    pub require_auth: bool,
    pub firebase_jwks_url: String,
    pub jwks_cache_ttl: Duration,
    pub auth_clock_skew: Duration,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("public_base_url", &self.public_base_url)
            .field("static_dir", &self.static_dir)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &self.supabase_anon_key)
            .field(
                "supabase_service_role_key",
                &redacted(self.supabase_service_role_key.as_ref()),
            )
            .field("expose_service_role_key", &self.expose_service_role_key)
            .field("firebase_api_key", &self.firebase_api_key)
            .field("firebase_auth_domain", &self.firebase_auth_domain)
            .field("firebase_project_id", &self.firebase_project_id)
            .field("firebase_storage_bucket", &self.firebase_storage_bucket)
            .field(
                "firebase_messaging_sender_id",
                &self.firebase_messaging_sender_id,
            )
            .field("firebase_app_id", &self.firebase_app_id)
            .field("ga_measurement_id", &self.ga_measurement_id)
            .field("dodo_api_key", &redacted(self.dodo_api_key.as_ref()))
            .field("dodo_product_id", &self.dodo_product_id)
            .field("dodo_api_base_url", &self.dodo_api_base_url)
            .field(
                "dodo_webhook_secret",
                &redacted(self.dodo_webhook_secret.as_ref()),
            )
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("require_auth", &self.require_auth)
            .field("firebase_jwks_url", &self.firebase_jwks_url)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = match optional_trimmed(&lookup, "VCNOTEBOOK_API_BIND_ADDR") {
            Some(addr) => addr,
            None => {
                let port = value_or_default(&lookup, "PORT", &DEFAULT_PORT.to_string())
                    .parse::<u16>()
                    .map_err(|_| {
                        ConfigError::Invalid("PORT must be an integer in [0, 65535]".to_string())
                    })?;
                format!("0.0.0.0:{port}")
            }
        };

        let public_base_url = optional_http_url(&lookup, "PUBLIC_BASE_URL")?;
        let static_dir = optional_trimmed(&lookup, "STATIC_DIR").map(PathBuf::from);

        let supabase_url = optional_http_url(&lookup, "SUPABASE_URL")?;
        let supabase_anon_key = optional_trimmed(&lookup, "SUPABASE_ANON_KEY");
        if supabase_url.is_some() != supabase_anon_key.is_some() {
            let missing = if supabase_url.is_none() {
                "SUPABASE_URL"
            } else {
                "SUPABASE_ANON_KEY"
            };
            return Err(ConfigError::MissingVar(missing));
        }
        let supabase_service_role_key = optional_trimmed(&lookup, "SUPABASE_SERVICE_ROLE_KEY");
        let expose_service_role_key = flag(&lookup, "EXPOSE_SERVICE_ROLE_KEY")?;

        let firebase_project_id = optional_trimmed(&lookup, "FIREBASE_PROJECT_ID");
        let require_auth = flag(&lookup, "REQUIRE_AUTH")?;
        if require_auth && firebase_project_id.is_none() {
            return Err(ConfigError::MissingVar("FIREBASE_PROJECT_ID"));
        }

        let dodo_api_base_url = trim_trailing(&value_or_default(
            &lookup,
            "DODO_API_BASE_URL",
            DEFAULT_DODO_API_BASE_URL,
        ))
        .to_string();
        if !is_http_url(&dodo_api_base_url) {
            return Err(ConfigError::Invalid(
                "DODO_API_BASE_URL must start with http:// or https://".to_string(),
            ));
        }

        let webhook_tolerance_secs =
            bounded_u64(&lookup, "WEBHOOK_TOLERANCE_SECS", "300", 30, 3_600)?;

        let firebase_jwks_url =
            value_or_default(&lookup, "FIREBASE_JWKS_URL", DEFAULT_FIREBASE_JWKS_URL);
        if !is_http_url(&firebase_jwks_url) {
            return Err(ConfigError::Invalid(
                "FIREBASE_JWKS_URL must start with http:// or https://".to_string(),
            ));
        }
        let jwks_cache_ttl_secs =
            bounded_u64(&lookup, "FIREBASE_JWKS_CACHE_TTL_SECS", "300", 30, 86_400)?;
        let auth_clock_skew_secs = bounded_u64(&lookup, "AUTH_CLOCK_SKEW_SECS", "60", 0, 300)?;

        Ok(Self {
            bind_addr,
            public_base_url,
            static_dir,
            supabase_url,
            supabase_anon_key,
            supabase_service_role_key,
            expose_service_role_key,
            firebase_api_key: optional_trimmed(&lookup, "FIREBASE_API_KEY"),
            firebase_auth_domain: optional_trimmed(&lookup, "FIREBASE_AUTH_DOMAIN"),
            firebase_project_id,
            firebase_storage_bucket: optional_trimmed(&lookup, "FIREBASE_STORAGE_BUCKET"),
            firebase_messaging_sender_id: optional_trimmed(
                &lookup,
                "FIREBASE_MESSAGING_SENDER_ID",
            ),
            firebase_app_id: optional_trimmed(&lookup, "FIREBASE_APP_ID"),
            ga_measurement_id: optional_trimmed(&lookup, "GA_MEASUREMENT_ID"),
            dodo_api_key: optional_trimmed(&lookup, "DODO_PAYMENTS_API_KEY"),
            dodo_product_id: optional_trimmed(&lookup, "PRODUCT_ID"),
            dodo_api_base_url,
            dodo_webhook_secret: optional_trimmed(&lookup, "DODO_WEBHOOK_SECRET"),
            webhook_tolerance: Duration::from_secs(webhook_tolerance_secs),
            require_auth,
            firebase_jwks_url,
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_secs),
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
        })
    }

    pub fn firebase_issuer(&self) -> Option<String> {
        self.firebase_project_id
            .as_deref()
            .map(|project| format!("https://securetoken.google.com/{project}"))
    }
}

fn redacted(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[REDACTED]")
}

fn bounded_u64(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let value = value_or_default(lookup, name, default)
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]")))?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(value)
}

fn flag(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Result<bool, ConfigError> {
    match optional_trimmed(lookup, name) {
        None => Ok(false),
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid(format!(
                "{name} must be true or false"
            ))),
        },
    }
}

fn optional_http_url(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<String>, ConfigError> {
    let Some(value) = optional_trimmed(lookup, name) else {
        return Ok(None);
    };
    if !is_http_url(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be an http:// or https:// URL"
        )));
    }
    Ok(Some(trim_trailing(&value).to_string()))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn is_http_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}
