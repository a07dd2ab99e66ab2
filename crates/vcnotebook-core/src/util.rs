//! Small helpers shared by the clients and controllers.

use chrono::{DateTime, Utc};

/// Trim optional text, treating blank values as absent.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Trim whitespace and trailing slashes from a base URL.
pub fn trim_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Content preview used in note listings: first 100 characters, with an
/// ellipsis when the content was cut.
pub fn snippet(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut preview: String = trimmed.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}

/// Human friendly day distance: "Today", "Yesterday", "N days ago", or the
/// calendar date for anything older than a week.
pub fn relative_day(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = now
        .date_naive()
        .signed_duration_since(timestamp.date_naive())
        .num_days();
    match days {
        i64::MIN..=0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=6 => format!("{days} days ago"),
        _ => timestamp.format("%Y-%m-%d").to_string(),
    }
}

/// Render a byte count with a binary unit suffix.
#[allow(clippy::cast_precision_loss)]
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}
