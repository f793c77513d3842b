use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};

use pulse_core::store::CooldownKey;

/// Minimum spacing between calls made with the same credential.
#[derive(Debug, Default)]
pub struct Pacer {
    min_interval: Duration,
    last_calls: DashMap<CooldownKey, Arc<Mutex<Option<Instant>>>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_calls: DashMap::new(),
        }
    }

    /// Wait until `key` may call again, then claim the slot.
    pub async fn wait_turn(&self, key: &CooldownKey) {
        if self.min_interval.is_zero() {
            return;
        }
        let slot = self.last_calls.entry(key.clone()).or_default().clone();
        let mut last_call = slot.lock().await;
        if let Some(last) = *last_call {
            let next = last + self.min_interval;
            if next > Instant::now() {
                time::sleep_until(next).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}
