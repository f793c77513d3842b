use pulse_util::truncate_chars;

use crate::consts::ERROR_BODY_MAX_CHARS;

pub fn permalink(handle: Option<&str>, id: &str) -> String {
    match handle {
        Some(handle) => format!("https://x.com/{}/status/{}", handle, id),
        None => format!("https://x.com/i/status/{}", id),
    }
}

pub(crate) fn error_snippet(body: &str) -> String {
    truncate_chars(body.trim(), ERROR_BODY_MAX_CHARS).to_string()
}

/// Seconds until `reset_epoch`, at least 1.
pub(crate) fn seconds_until(reset_epoch: i64, now_epoch: i64) -> u64 {
    (reset_epoch - now_epoch).max(1) as u64
}
