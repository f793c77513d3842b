use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

pub const SEARCH_TTL: Duration = Duration::from_secs(15 * 60);
pub const PROFILE_TTL: Duration = Duration::from_secs(15 * 60);
pub const LIST_FEED_TTL: Duration = Duration::from_secs(15 * 60);
pub const RANKED_TTL: Duration = Duration::from_secs(5 * 60);
pub const LIST_SENTIMENT_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: Arc<T>,
    pub timestamp: DateTime<Utc>,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.timestamp).to_std() {
            Ok(age) => age < self.ttl,
            // Written "in the future" relative to `now`
            Err(_) => true,
        }
    }
}

/// TTL cache of immutable payloads. Entries are replaced, never edited.
#[derive(Debug)]
pub struct ResponseCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T> Default for ResponseCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> ResponseCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Arc<T>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.payload.clone())
    }

    /// Store `payload` under `key`. Expired entries are dropped on the way so the map stays bounded.
    pub async fn set(&self, key: &str, payload: T, ttl: Duration, now: DateTime<Utc>) -> Arc<T> {
        let payload = Arc::new(payload);
        let entry = CacheEntry {
            key: key.to_string(),
            payload: payload.clone(),
            timestamp: now,
            ttl,
        };
        let mut entries = self.entries.write().await;
        entries.retain(|_, existing| existing.is_fresh(now));
        entries.insert(key.to_string(), entry);
        payload
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// `kind|part|part|...`. Every parameter that changes the result must be a part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new(kind: &str) -> Self {
        Self(vec![kind.to_string()])
    }

    pub fn part(mut self, value: impl Display) -> Self {
        self.0.push(value.to_string().replace('|', "\\|"));
        self
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("|"))
    }
}
