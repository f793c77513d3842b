//! Refresh one asset's X sentiment and merge it into the persisted file, then exit.
//!
//! Usage: `vibe_check [ASSET]`. Without an argument the asset comes from the current
//! 15-minute slot, so a cron entry cycles through every tracked asset.

use std::env;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dotenvy::dotenv;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use pulse_core::{persist::merge_sentiment_entry, store::SqliteRateLimitStore, Settings};
use pulse_research::{retry_transport, Engine};

const SLOT_SECONDS: i64 = 15 * 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Initialize logger
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()?
        .add_directive("hyper::proto=info".parse()?)
        .add_directive("hyper::client=info".parse()?)
        .add_directive("reqwest=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    // 2. Load configuration
    let settings = Settings::from_env()?;
    if !settings.is_configured() {
        tracing::warn!("X_BEARER_TOKEN is not set, nothing to refresh");
        return Ok(());
    }

    // 3. Pick the asset
    let now = Utc::now();
    let asset = match env::args().nth(1) {
        Some(asset) => asset.trim().trim_start_matches('$').to_uppercase(),
        None => slot_asset(&settings.assets, now).to_string(),
    };
    let cache_path = settings.cache_path.clone();

    // 4. Build engine on the shared store
    let store = SqliteRateLimitStore::open(&settings.database_url)?;
    let engine = Engine::build(settings, Arc::new(store))?;
    let Some(research) = &engine.background else {
        tracing::warn!("No X credential available for background work");
        return Ok(());
    };

    // 5. Respect the shared cooldown
    let pool = research.pool();
    let credential_index = slot(now) % pool.len();
    if let Some(credential) = pool.select(Some(credential_index), &asset) {
        if let Err(e) = pool.ensure_available(&credential, now) {
            tracing::info!("Skipping {}: {} is cooling down ({})", asset, credential.key, e);
            return Ok(());
        }
    }

    // 6. Score and merge
    let sentiment = &engine.sentiment;
    match retry_transport(|| sentiment.score_asset(&asset, Some(credential_index))).await {
        Ok(entry) => {
            let entries = merge_sentiment_entry(&cache_path, &asset, entry.clone()).await?;
            tracing::info!(
                "{}: {} ({}%) written to {} ({} assets)",
                asset,
                entry.sentiment,
                entry.confidence,
                cache_path.display(),
                entries.len()
            );
            Ok(())
        }
        Err(e) if e.is_rate_limited() => {
            tracing::warn!("{} not refreshed: {}", asset, e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn slot(now: DateTime<Utc>) -> usize {
    (now.timestamp().max(0) / SLOT_SECONDS) as usize
}

fn slot_asset(assets: &[String], now: DateTime<Utc>) -> &str {
    // Settings guarantees at least one asset
    assets
        .get(slot(now) % assets.len().max(1))
        .map(String::as_str)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slot_asset_rotates() {
        let assets: Vec<String> = ["BTC", "ETH", "SOL"].iter().map(|a| a.to_string()).collect();
        let start = Utc.timestamp_opt(SLOT_SECONDS * 300, 0).unwrap();
        let picked: Vec<_> = (0..4)
            .map(|i| slot_asset(&assets, start + chrono::Duration::seconds(SLOT_SECONDS * i + 7)))
            .collect();
        assert_eq!(picked, vec!["BTC", "ETH", "SOL", "BTC"]);
        assert_eq!(slot_asset(&[], start), "");
    }
}
