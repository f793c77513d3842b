use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use pulse_core::store::{CooldownKey, PoolKind, RateLimitStore};
use pulse_core::{Error, Result, Settings};
use pulse_util::parse_rate_limit_reset_seconds;

/// A bearer credential. Everything but the cooldown watermark is fixed at start-up.
pub struct Credential {
    token: String,
    pub index: usize,
    pub kind: PoolKind,
    pub key: CooldownKey,
    /// Local copy of the watermark in epoch millis, 0 when clear.
    cooldown_until_ms: AtomicI64,
}

impl Credential {
    pub fn new(token: &str, kind: PoolKind, index: usize) -> Self {
        Self {
            token: token.to_string(),
            index,
            kind,
            key: CooldownKey::new(kind, index),
            cooldown_until_ms: AtomicI64::new(0),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn local_cooldown(&self) -> Option<DateTime<Utc>> {
        match self.cooldown_until_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    fn raise_local(&self, until: DateTime<Utc>) {
        self.cooldown_until_ms.fetch_max(until.timestamp_millis(), Ordering::SeqCst);
    }

    fn replace_local(&self, until: Option<DateTime<Utc>>) {
        self.cooldown_until_ms
            .store(until.map(|t| t.timestamp_millis()).unwrap_or(0), Ordering::SeqCst);
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("key", &self.key)
            .field("cooldown_until", &self.local_cooldown())
            .finish()
    }
}

/// What a 429 told us about when the credential can be used again.
#[derive(Debug, Clone, Default)]
pub struct RateLimitHint {
    pub reset_epoch: Option<i64>,
    pub message: String,
}

impl From<&x_client::Error> for RateLimitHint {
    fn from(err: &x_client::Error) -> Self {
        match err {
            x_client::Error::RateLimited {
                reset_epoch,
                message,
                wait_seconds,
            } => Self {
                reset_epoch: *reset_epoch,
                message: if message.is_empty() {
                    format!("Resets in {}s", wait_seconds)
                } else {
                    message.clone()
                },
            },
            other => Self {
                reset_epoch: None,
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub struct CredentialPool {
    kind: PoolKind,
    credentials: Vec<Arc<Credential>>,
    store: Arc<dyn RateLimitStore>,
    floor: Duration,
    safety_buffer: Duration,
}

impl CredentialPool {
    pub fn new(
        kind: PoolKind,
        tokens: &[String],
        store: Arc<dyn RateLimitStore>,
        floor: Duration,
        safety_buffer: Duration,
    ) -> Self {
        let credentials = tokens
            .iter()
            .enumerate()
            .map(|(index, token)| Arc::new(Credential::new(token, kind, index)))
            .collect();
        Self {
            kind,
            credentials,
            store,
            floor,
            safety_buffer,
        }
    }

    /// Foreground and background pools. Without background tokens the background pool
    /// reuses the foreground credential, watermark included.
    pub fn from_settings(settings: &Settings, store: Arc<dyn RateLimitStore>) -> (Arc<Self>, Arc<Self>) {
        let foreground_tokens: Vec<String> = settings.foreground_token.iter().cloned().collect();
        let foreground = Self::new(
            PoolKind::Foreground,
            &foreground_tokens,
            store.clone(),
            settings.rate_limit_floor,
            settings.safety_buffer,
        );
        let background = if settings.has_background_pool() {
            Self::new(
                PoolKind::Background,
                &settings.background_tokens,
                store,
                settings.rate_limit_floor,
                settings.safety_buffer,
            )
        } else {
            Self {
                kind: PoolKind::Background,
                credentials: foreground.credentials.clone(),
                store,
                floor: settings.rate_limit_floor,
                safety_buffer: settings.safety_buffer,
            }
        };
        (Arc::new(foreground), Arc::new(background))
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Pick a credential: `index` round-robins explicitly, otherwise a stable hash of `query`.
    pub fn select(&self, index: Option<usize>, query: &str) -> Option<Arc<Credential>> {
        if self.credentials.is_empty() {
            return None;
        }
        let slot = match index {
            Some(index) => index % self.credentials.len(),
            None => stable_slot(query, self.credentials.len()),
        };
        Some(self.credentials[slot].clone())
    }

    /// Current watermark. The shared store is read first and the local copy is synced to it;
    /// the local copy is only used when the store cannot be read.
    pub fn cooldown_until(&self, credential: &Credential) -> Option<DateTime<Utc>> {
        match self.store.get(&credential.key) {
            Ok(until) => {
                credential.replace_local(until);
                until
            }
            Err(e) => {
                tracing::warn!("Cannot read cooldown {}: {}. Using local copy", credential.key, e);
                credential.local_cooldown()
            }
        }
    }

    /// Fails while the credential is cooling. On success returns the (expired) watermark that was
    /// seen, to hand back to `on_success` after the call.
    pub fn ensure_available(&self, credential: &Credential, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let Some(until) = self.cooldown_until(credential) else {
            return Ok(None);
        };
        let usable_at = until + chrono::Duration::from_std(self.safety_buffer).unwrap_or_default();
        if now < usable_at {
            let wait_ms = usable_at.signed_duration_since(now).num_milliseconds().max(0) as u64;
            return Err(Error::RateLimited {
                wait_seconds: wait_ms.div_ceil(1000).max(1),
            });
        }
        Ok(Some(until))
    }

    /// Record a 429 for `credential`. Returns the applied wait in seconds.
    pub fn on_rate_limited(&self, credential: &Credential, hint: &RateLimitHint, now: DateTime<Utc>) -> u64 {
        let parsed = match hint.reset_epoch {
            Some(reset) => (reset - now.timestamp()).max(0) as u64,
            None => parse_rate_limit_reset_seconds(&hint.message),
        };
        let wait_seconds = parsed.max(self.floor.as_secs());
        let until = now + chrono::Duration::seconds(wait_seconds as i64);

        credential.raise_local(until);
        if let Err(e) = self.store.set(&credential.key, until) {
            tracing::warn!("Cannot persist cooldown {}: {}", credential.key, e);
        }
        tracing::warn!("Credential {} rate limited for {}s", credential.key, wait_seconds);
        wait_seconds
    }

    /// A successful call clears the watermark `seen` before it. A later 429 recorded while the
    /// call was in flight is kept.
    pub fn on_success(&self, credential: &Credential, seen: Option<DateTime<Utc>>) {
        let Some(seen) = seen else {
            return;
        };
        // The local copy only drops if nothing raised it past `seen` meanwhile
        let _ = credential.cooldown_until_ms.compare_exchange(
            seen.timestamp_millis(),
            0,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        match self.store.clear_through(&credential.key, seen) {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Keeping newer cooldown {} set during the call", credential.key),
            Err(e) => tracing::warn!("Cannot clear cooldown {}: {}", credential.key, e),
        }
    }
}

/// First 8 bytes of the md5 digest, modulo `n`.
fn stable_slot(query: &str, n: usize) -> usize {
    let digest = md5::compute(query.trim().to_lowercase().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.0[..8]);
    (u64::from_le_bytes(head) % n as u64) as usize
}
