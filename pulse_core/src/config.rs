use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use pulse_util::{parse_comma_list, parse_lookback, parse_non_empty_list};

use crate::error::{Error, Result};

pub const DEFAULT_ASSETS: &str = "BTC,ETH,SOL,HYPE";
pub const DEFAULT_REFRESH_MINUTES: u64 = 60;
pub const MAX_REFRESH_MINUTES: u64 = 24 * 60;
pub const DEFAULT_MIN_TWEETS: usize = 3;
pub const DEFAULT_BULL_BEAR_THRESHOLD: f64 = 0.15;
pub const DEFAULT_ENGAGEMENT_CAP: f64 = 3.0;
pub const DEFAULT_RISK_MIN_TWEETS: usize = 2;
pub const DEFAULT_SINCE: &str = "1d";
pub const DEFAULT_SORT_ORDER: &str = "relevancy";
pub const DEFAULT_MAX_RESULTS: u32 = 30;
pub const DEFAULT_CACHE_PATH: &str = ".pulse/x-sentiment-cache.json";
pub const DEFAULT_MIN_CALL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_RATE_LIMIT_FLOOR_SECONDS: u64 = 60;
pub const DEFAULT_SAFETY_BUFFER_SECONDS: u64 = 2;
pub const DEFAULT_DATABASE_URL: &str = ".pulse/pulse.db";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:3800";

/// Configuration for the whole subsystem. Built once at start-up and passed to every component.
#[derive(Debug, Clone)]
pub struct Settings {
    pub foreground_token: Option<String>,
    pub background_tokens: Vec<String>,

    pub sentiment_enabled: bool,
    pub refresh_interval: Duration,
    pub assets: Vec<String>,
    pub min_tweets: usize,
    pub bull_bear_threshold: f64,
    pub engagement_cap: f64,
    pub risk_min_tweets: usize,
    pub since: String,
    pub sort_order: String,
    pub max_results: u32,
    pub min_likes: u64,
    pub min_followers: u64,
    pub keywords_path: Option<PathBuf>,
    pub cache_path: PathBuf,
    pub list_id: Option<String>,

    pub min_call_interval: Duration,
    pub rate_limit_floor: Duration,
    pub safety_buffer: Duration,

    pub database_url: String,
    pub server_address: String,
}

impl Settings {
    pub fn from_env() -> Result<Settings> {
        Settings::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Settings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let since = get("X_SENTIMENT_SINCE").unwrap_or_else(|| DEFAULT_SINCE.to_string());
        parse_lookback(&since, Utc::now())?;

        let sort_order = get("X_SENTIMENT_SORT_ORDER")
            .unwrap_or_else(|| DEFAULT_SORT_ORDER.to_string())
            .to_lowercase();
        if sort_order != "relevancy" && sort_order != "recency" {
            return Err(Error::InvalidConfig(format!("X_SENTIMENT_SORT_ORDER={}", sort_order)));
        }

        let assets = parse_non_empty_list(&get("X_SENTIMENT_ASSETS").unwrap_or_else(|| DEFAULT_ASSETS.to_string()))?
            .into_iter()
            .map(|asset| asset.to_uppercase())
            .collect();

        let refresh_minutes = number(&get, "X_SENTIMENT_REFRESH_MINUTES", DEFAULT_REFRESH_MINUTES)?;

        let threshold: f64 = number(&get, "X_SENTIMENT_BULL_BEAR_THRESHOLD", DEFAULT_BULL_BEAR_THRESHOLD)?;
        if !(0.0..1.0).contains(&threshold) {
            return Err(Error::InvalidConfig(format!("X_SENTIMENT_BULL_BEAR_THRESHOLD={}", threshold)));
        }
        let engagement_cap: f64 = number(&get, "X_SENTIMENT_ENGAGEMENT_CAP", DEFAULT_ENGAGEMENT_CAP)?;
        if engagement_cap < 1.0 {
            return Err(Error::InvalidConfig(format!("X_SENTIMENT_ENGAGEMENT_CAP={}", engagement_cap)));
        }

        Ok(Settings {
            foreground_token: get("X_BEARER_TOKEN"),
            background_tokens: get("X_BEARER_TOKEN_BACKGROUND")
                .map(|s| parse_comma_list(&s))
                .unwrap_or_default(),
            sentiment_enabled: flag(&get, "X_SENTIMENT_ENABLED", true)?,
            refresh_interval: Duration::from_secs(refresh_minutes.clamp(1, MAX_REFRESH_MINUTES) * 60),
            assets,
            min_tweets: number(&get, "X_SENTIMENT_MIN_TWEETS", DEFAULT_MIN_TWEETS)?,
            bull_bear_threshold: threshold,
            engagement_cap,
            risk_min_tweets: number(&get, "X_SENTIMENT_RISK_MIN_TWEETS", DEFAULT_RISK_MIN_TWEETS)?,
            since,
            sort_order,
            max_results: number(&get, "X_SENTIMENT_MAX_RESULTS", DEFAULT_MAX_RESULTS)?,
            min_likes: number(&get, "X_SENTIMENT_MIN_LIKES", 0)?,
            min_followers: number(&get, "X_SENTIMENT_MIN_FOLLOWERS", 0)?,
            keywords_path: get("X_SENTIMENT_KEYWORDS_PATH").map(PathBuf::from),
            cache_path: PathBuf::from(get("X_SENTIMENT_CACHE_PATH").unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string())),
            list_id: get("X_LIST_ID"),
            min_call_interval: Duration::from_millis(number(
                &get,
                "X_MIN_CALL_INTERVAL_MS",
                DEFAULT_MIN_CALL_INTERVAL_MS,
            )?),
            rate_limit_floor: Duration::from_secs(number(
                &get,
                "X_RATE_LIMIT_FLOOR_SECONDS",
                DEFAULT_RATE_LIMIT_FLOOR_SECONDS,
            )?),
            safety_buffer: Duration::from_secs(number(
                &get,
                "X_RATE_LIMIT_SAFETY_BUFFER_SECONDS",
                DEFAULT_SAFETY_BUFFER_SECONDS,
            )?),
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            server_address: get("SERVER_ADDRESS").unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string()),
        })
    }

    /// Whether a foreground credential is present. Nothing else is required.
    pub fn is_configured(&self) -> bool {
        self.foreground_token.is_some()
    }

    /// Whether background work has credentials of its own.
    pub fn has_background_pool(&self) -> bool {
        !self.background_tokens.is_empty()
    }
}

// MARK: Helpers

fn number<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| Error::InvalidConfig(format!("{}={}", key, value))),
        None => Ok(default),
    }
}

fn flag<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => Ok(false),
        Some(v) => Err(Error::InvalidConfig(format!("{}={}", key, v))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();
        assert!(!settings.is_configured());
        assert!(settings.sentiment_enabled);
        assert_eq!(settings.assets, vec!["BTC", "ETH", "SOL", "HYPE"]);
        assert_eq!(settings.refresh_interval, Duration::from_secs(3600));
        assert_eq!(settings.min_tweets, 3);
        assert_eq!(settings.risk_min_tweets, 2);
        assert_eq!(settings.bull_bear_threshold, 0.15);
        assert_eq!(settings.sort_order, "relevancy");
        assert_eq!(settings.min_call_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_credentials() {
        let settings = settings(&[
            ("X_BEARER_TOKEN", "fg"),
            ("X_BEARER_TOKEN_BACKGROUND", "bg1, bg2,"),
            ("X_SENTIMENT_ASSETS", "btc,eth"),
        ])
        .unwrap();
        assert!(settings.is_configured());
        assert!(settings.has_background_pool());
        assert_eq!(settings.background_tokens, vec!["bg1", "bg2"]);
        assert_eq!(settings.assets, vec!["BTC", "ETH"]);
    }

    #[test]
    fn test_refresh_interval_clamped() {
        let low = settings(&[("X_SENTIMENT_REFRESH_MINUTES", "0")]).unwrap();
        assert_eq!(low.refresh_interval, Duration::from_secs(60));
        let high = settings(&[("X_SENTIMENT_REFRESH_MINUTES", "100000")]).unwrap();
        assert_eq!(high.refresh_interval, Duration::from_secs(MAX_REFRESH_MINUTES * 60));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            settings(&[("X_SENTIMENT_MIN_TWEETS", "three")]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            settings(&[("X_SENTIMENT_SORT_ORDER", "popular")]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            settings(&[("X_SENTIMENT_ENABLED", "maybe")]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(settings(&[("X_SENTIMENT_SINCE", "last week")]).is_err());
    }
}
