//! Pre-deployment check of the proxy environment.

use std::env;

pub const REQUIRED_VARS: [&str; 9] = [
    "FIREBASE_API_KEY",
    "FIREBASE_AUTH_DOMAIN",
    "FIREBASE_PROJECT_ID",
    "FIREBASE_STORAGE_BUCKET",
    "FIREBASE_MESSAGING_SENDER_ID",
    "FIREBASE_APP_ID",
    "SUPABASE_URL",
    "SUPABASE_ANON_KEY",
    "SUPABASE_SERVICE_ROLE_KEY",
];

pub const OPTIONAL_VARS: [&str; 5] = [
    "GA_MEASUREMENT_ID",
    "DODO_PAYMENTS_API_KEY",
    "PRODUCT_ID",
    "DODO_WEBHOOK_SECRET",
    "PORT",
];

const VISIBLE_PREFIX_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvReport {
    pub lines: Vec<String>,
    pub all_required: bool,
}

/// Render the checklist. Required values show only a short prefix; optional
/// values are never echoed.
pub fn check_env(lookup: impl Fn(&str) -> Option<String>) -> EnvReport {
    let value_of = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
    let mut lines = vec![
        "Required environment variables:".to_string(),
        "================================".to_string(),
    ];

    let mut all_required = true;
    for name in REQUIRED_VARS {
        match value_of(name) {
            Some(value) => {
                let prefix: String = value.chars().take(VISIBLE_PREFIX_CHARS).collect();
                lines.push(format!("[ok]      {name}: Set ({prefix}...)"));
            }
            None => {
                all_required = false;
                lines.push(format!("[missing] {name}: MISSING"));
            }
        }
    }

    lines.push(String::new());
    lines.push("Optional environment variables:".to_string());
    lines.push("================================".to_string());
    let mut any_optional = false;
    for name in OPTIONAL_VARS {
        if value_of(name).is_some() {
            any_optional = true;
            lines.push(format!("[ok]      {name}: Set"));
        } else {
            lines.push(format!("[warn]    {name}: Not Set"));
        }
    }

    lines.push(String::new());
    if all_required {
        lines.push("All required environment variables are set.".to_string());
        if any_optional {
            lines.push("Optional features are configured.".to_string());
        } else {
            lines.push("Optional features are not configured (analytics, payments).".to_string());
        }
    } else {
        lines.push("Some required environment variables are missing.".to_string());
        lines.push("Add them to .env locally or to the hosting dashboard; never commit .env.".to_string());
    }

    EnvReport {
        lines,
        all_required,
    }
}

/// Print the checklist for the current process environment (after `.env`).
pub fn run_verify_env() -> bool {
    let report = check_env(|name| env::var(name).ok());
    for line in &report.lines {
        println!("{line}");
    }
    report.all_required
}
