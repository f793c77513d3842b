use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Entries older than this are read as stale.
pub const SENTIMENT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl SentimentLabel {
    /// Signed value used when a phrase override decides an item.
    pub fn signum(&self) -> f64 {
        match self {
            SentimentLabel::Bullish => 1.0,
            SentimentLabel::Bearish => -1.0,
            SentimentLabel::Neutral => 0.0,
        }
    }
}

impl Display for SentimentLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SentimentLabel::Bullish => "bullish",
            SentimentLabel::Bearish => "bearish",
            SentimentLabel::Neutral => "neutral",
        };
        write!(f, "{}", s)
    }
}

/// One scored asset, as persisted in the sentiment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentEntry {
    pub sentiment: SentimentLabel,
    pub confidence: u8,
    pub risk_flag: bool,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub contrarian: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrarian_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<usize>,
}

impl SentimentEntry {
    pub fn updated_date(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.updated_at).single()
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.is_fresh_within(now, Duration::hours(SENTIMENT_TTL_HOURS))
    }

    pub fn is_fresh_within(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.updated_date() {
            Some(updated) => now.signed_duration_since(updated) < ttl,
            None => false,
        }
    }
}

/// What the read API hands to consumers. Always has a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentReading {
    pub sentiment: SentimentLabel,
    pub confidence: u8,
    pub risk_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub contrarian: bool,
}

impl SentimentReading {
    pub fn neutral() -> Self {
        Self {
            sentiment: SentimentLabel::Neutral,
            confidence: 0,
            risk_flag: false,
            updated_at: None,
            contrarian: false,
        }
    }
}

impl From<&SentimentEntry> for SentimentReading {
    fn from(entry: &SentimentEntry) -> Self {
        Self {
            sentiment: entry.sentiment,
            confidence: entry.confidence,
            risk_flag: entry.risk_flag,
            updated_at: Some(entry.updated_at),
            contrarian: entry.contrarian,
        }
    }
}
