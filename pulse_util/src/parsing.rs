use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ParsingError {
    #[error("Invalid lookback window: {0}")]
    InvalidLookback(String),
    #[error("Invalid list: {0}")]
    InvalidList(String),
}

type Result<T> = std::result::Result<T, ParsingError>;

lazy_static! {
    static ref RESET_HINT: Regex = Regex::new(r"(?i)(?:resets?|retry)\s+(?:in|after)\s+(\d+)\s*s").unwrap();
    static ref LOOKBACK: Regex = Regex::new(r"^(\d+)\s*(m|h|d)$").unwrap();
}

/// Extract the wait hint from a rate-limit message such as `Resets in 120s` or `retry in 30s`.
/// Returns 0 when the message carries no hint.
pub fn parse_rate_limit_reset_seconds(message: &str) -> u64 {
    RESET_HINT
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|n| n.max(1))
        .unwrap_or(0)
}

/// Parse a lookback window (`30m`, `12h`, `7d`) or an absolute RFC 3339 timestamp into the start of the window.
pub fn parse_lookback(since: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let since = since.trim();
    if let Some(caps) = LOOKBACK.captures(since) {
        let amount = caps[1]
            .parse::<i64>()
            .map_err(|_| ParsingError::InvalidLookback(since.to_string()))?;
        let window = match &caps[2] {
            "m" => Duration::minutes(amount),
            "h" => Duration::hours(amount),
            _ => Duration::days(amount),
        };
        return Ok(now - window);
    }
    DateTime::parse_from_rfc3339(since)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ParsingError::InvalidLookback(since.to_string()))
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_comma_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect()
}

/// Same as `parse_comma_list`, but an empty result is an error.
pub fn parse_non_empty_list(s: &str) -> Result<Vec<String>> {
    let items = parse_comma_list(s);
    if items.is_empty() {
        return Err(ParsingError::InvalidList(s.to_string()));
    }
    Ok(items)
}

/// Truncate to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
