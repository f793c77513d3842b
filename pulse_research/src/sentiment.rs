use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use itertools::Itertools;
use phf::phf_map;
use serde::Serialize;

use pulse_core::persist::{load_sentiment_file, write_sentiment_file, SentimentFile};
use pulse_core::{Error, Result, SentimentEntry, SentimentReading, Settings};
use pulse_sentiment::{score_items, Lexicon, ScoreConfig, ScoreItem};
use x_client::{SortOrder, TweetRecord};

use crate::adapter::{ListOptions, SearchOptions, XResearch};
use crate::cache::{ResponseCache, LIST_SENTIMENT_TTL};

/// Tickers that are ambiguous as cashtags.
static ASSET_QUERIES: phf::Map<&'static str, &'static str> = phf_map! {
    "HYPE" => "HYPE crypto",
};

const SENTIMENT_QUERY_FILTERS: &str = "lang:en -is:retweet -is:reply";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    #[default]
    Idle,
    Refreshing,
    Scored,
}

/// What one scheduler tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Disabled,
    NotConfigured,
    Skipped { asset: String, wait_seconds: u64 },
    Refreshed { asset: String, entry: SentimentEntry },
    RateLimited { asset: String, wait_seconds: u64 },
    Failed { asset: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatus {
    pub asset: String,
    pub state: AssetState,
    pub reading: SentimentReading,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentStatus {
    pub configured: bool,
    pub enabled: bool,
    pub cooldown_until: Option<i64>,
    pub assets: Vec<AssetStatus>,
}

/// Background sentiment for the tracked assets. One asset is refreshed per tick, results are
/// persisted after every refresh and served from memory.
#[derive(Debug)]
pub struct SentimentService {
    settings: Arc<Settings>,
    research: Option<Arc<XResearch>>,
    lexicon: Lexicon,
    score_config: ScoreConfig,
    cache_path: PathBuf,
    entries: DashMap<String, SentimentEntry>,
    states: DashMap<String, AssetState>,
    cursor: AtomicUsize,
    /// Latest cooldown seen mid-tick, epoch millis.
    local_watermark_ms: AtomicI64,
    list_cache: ResponseCache<SentimentEntry>,
}

impl SentimentService {
    /// `research` is the background adapter, absent when no credential is configured.
    pub fn new(settings: Arc<Settings>, research: Option<Arc<XResearch>>) -> Self {
        let lexicon = Lexicon::load_or_default(settings.keywords_path.as_deref());
        let score_config = ScoreConfig::from_settings(&settings);
        let service = Self {
            cache_path: settings.cache_path.clone(),
            settings,
            research,
            lexicon,
            score_config,
            entries: DashMap::new(),
            states: DashMap::new(),
            cursor: AtomicUsize::new(0),
            local_watermark_ms: AtomicI64::new(0),
            list_cache: ResponseCache::new(),
        };
        service.load();
        service
    }

    pub fn is_configured(&self) -> bool {
        self.research.is_some()
    }

    /// Never fails. Missing or stale data reads as neutral with zero confidence.
    pub fn get_sentiment(&self, asset: &str) -> SentimentReading {
        self.get_sentiment_at(asset, Utc::now())
    }

    pub fn get_sentiment_at(&self, asset: &str, now: DateTime<Utc>) -> SentimentReading {
        match self.entries.get(&asset.to_uppercase()) {
            Some(entry) if entry.is_fresh(now) => SentimentReading::from(entry.value()),
            _ => SentimentReading::neutral(),
        }
    }

    pub fn asset_state(&self, asset: &str) -> AssetState {
        self.states
            .get(&asset.to_uppercase())
            .map(|s| *s)
            .unwrap_or_default()
    }

    pub fn local_watermark(&self) -> Option<DateTime<Utc>> {
        match self.local_watermark_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    pub fn status(&self) -> SentimentStatus {
        let now = Utc::now();
        SentimentStatus {
            configured: self.is_configured(),
            enabled: self.settings.sentiment_enabled,
            cooldown_until: self.local_watermark().filter(|t| *t > now).map(|t| t.timestamp_millis()),
            assets: self
                .settings
                .assets
                .iter()
                .map(|asset| AssetStatus {
                    asset: asset.clone(),
                    state: self.asset_state(asset),
                    reading: self.get_sentiment_at(asset, now),
                })
                .collect(),
        }
    }

    pub fn snapshot(&self) -> SentimentFile {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect::<BTreeMap<_, _>>()
    }

    /// Refresh the asset at the rotating cursor. Never fails; the outcome says what happened.
    pub async fn tick(&self) -> TickOutcome {
        if !self.settings.sentiment_enabled {
            return TickOutcome::Disabled;
        }
        let Some(research) = &self.research else {
            return TickOutcome::NotConfigured;
        };
        if self.settings.assets.is_empty() || research.pool().is_empty() {
            return TickOutcome::NotConfigured;
        }

        let slot = self.cursor.fetch_add(1, Ordering::SeqCst);
        let asset = self.settings.assets[slot % self.settings.assets.len()].clone();
        let credential_index = slot % research.pool().len();

        // A cooling credential means this tick is a no-op
        if let Some(credential) = research.pool().select(Some(credential_index), &asset) {
            if let Err(e) = research.pool().ensure_available(&credential, Utc::now()) {
                let wait_seconds = e.wait_seconds().unwrap_or_default();
                tracing::info!("Skipping X sentiment for {}: {} cooling for {}s", asset, credential.key, wait_seconds);
                return TickOutcome::Skipped { asset, wait_seconds };
            }
        }

        match self.refresh_asset(&asset, Some(credential_index)).await {
            Ok(entry) => TickOutcome::Refreshed { asset, entry },
            Err(Error::RateLimited { wait_seconds }) => {
                let until = Utc::now() + chrono::Duration::seconds(wait_seconds as i64);
                self.local_watermark_ms
                    .fetch_max(until.timestamp_millis(), Ordering::SeqCst);
                tracing::warn!("X sentiment for {} rate limited, waiting {}s", asset, wait_seconds);
                TickOutcome::RateLimited { asset, wait_seconds }
            }
            Err(e) => {
                tracing::warn!("X sentiment refresh for {} failed: {}", asset, e);
                TickOutcome::Failed {
                    asset,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Fetch, score, store and persist one asset.
    pub async fn refresh_asset(&self, asset: &str, credential_index: Option<usize>) -> Result<SentimentEntry> {
        let asset = asset.to_uppercase();
        self.states.insert(asset.clone(), AssetState::Refreshing);
        let result = self.score_asset(&asset, credential_index).await;
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                self.states.insert(asset.clone(), AssetState::Idle);
                return Err(e);
            }
        };

        self.entries.insert(asset.clone(), entry.clone());
        self.states.insert(asset.clone(), AssetState::Scored);
        if let Err(e) = self.persist().await {
            tracing::warn!("Cannot persist X sentiment to {}: {}", self.cache_path.display(), e);
        }
        self.states.insert(asset, AssetState::Idle);
        Ok(entry)
    }

    /// Fetch and score one asset without touching the stored entries.
    pub async fn score_asset(&self, asset: &str, credential_index: Option<usize>) -> Result<SentimentEntry> {
        let Some(research) = &self.research else {
            return Err(Error::NotConfigured("X_BEARER_TOKEN is not set".to_string()));
        };
        let opts = SearchOptions {
            max_results: self.settings.max_results,
            sort_order: self.settings.sort_order.parse().unwrap_or(SortOrder::Relevancy),
            since: Some(self.settings.since.clone()),
            credential_index,
            ..Default::default()
        };
        let records = research.search(&asset_query(asset), &opts).await?;
        let records = self.filter_records(records);
        let entry = self.score_records(&records);
        tracing::info!(
            "X sentiment {}: {} ({}%) from {} posts{}",
            asset,
            entry.sentiment,
            entry.confidence,
            records.len(),
            if entry.risk_flag { ", risk flagged" } else { "" }
        );
        Ok(entry)
    }

    /// Sentiment of the curated list feed, cached separately with a short TTL.
    pub async fn list_sentiment(&self) -> SentimentReading {
        let (Some(research), Some(list_id)) = (&self.research, &self.settings.list_id) else {
            return SentimentReading::neutral();
        };
        let now = Utc::now();
        if let Some(entry) = self.list_cache.get(list_id, now).await {
            return SentimentReading::from(&*entry);
        }
        match research.get_list_feed(list_id, &ListOptions::default()).await {
            Ok(records) => {
                let entry = self.score_records(&self.filter_records(records));
                tracing::info!("X list sentiment: {} ({}%)", entry.sentiment, entry.confidence);
                let entry = self.list_cache.set(list_id, entry, LIST_SENTIMENT_TTL, now).await;
                SentimentReading::from(&*entry)
            }
            Err(e) => {
                tracing::warn!("X list sentiment failed: {}", e);
                SentimentReading::neutral()
            }
        }
    }

    /// Write the in-memory map, first adopting any newer entries another writer left on disk.
    pub async fn persist(&self) -> Result<()> {
        match self.adopt_from_disk() {
            Ok(0) => {}
            Ok(n) => tracing::info!("Adopted {} newer X sentiment entries from {}", n, self.cache_path.display()),
            Err(e) => tracing::warn!("Cannot re-read X sentiment from {}, overwriting: {}", self.cache_path.display(), e),
        }
        write_sentiment_file(&self.cache_path, &self.snapshot()).await
    }

    #[cfg(test)]
    pub(crate) fn insert_entry(&self, asset: &str, entry: SentimentEntry) {
        self.entries.insert(asset.to_uppercase(), entry);
    }
}

impl SentimentService {
    fn load(&self) {
        match self.adopt_from_disk() {
            Ok(0) => {}
            Ok(n) => tracing::info!("Loaded {} X sentiment entries from {}", n, self.cache_path.display()),
            Err(e) => tracing::warn!("Cannot load X sentiment from {}: {}", self.cache_path.display(), e),
        }
    }

    /// Take every disk entry that is newer than (or missing from) memory. Returns how many were taken.
    fn adopt_from_disk(&self) -> Result<usize> {
        let mut adopted = 0;
        for (asset, entry) in load_sentiment_file(&self.cache_path)? {
            let asset = asset.to_uppercase();
            let newer = self
                .entries
                .get(&asset)
                .map_or(true, |current| entry.updated_at > current.updated_at);
            if newer {
                self.entries.insert(asset, entry);
                adopted += 1;
            }
        }
        Ok(adopted)
    }

    fn filter_records(&self, records: Vec<TweetRecord>) -> Vec<TweetRecord> {
        records
            .into_iter()
            .filter(|r| r.metrics.likes >= self.settings.min_likes)
            .filter(|r| r.author_followers >= self.settings.min_followers)
            .collect()
    }

    fn score_records(&self, records: &[TweetRecord]) -> SentimentEntry {
        let items = records
            .iter()
            .map(|r| ScoreItem::new(&r.text, r.metrics.likes))
            .collect_vec();
        score_items(&items, &self.lexicon, &self.score_config).to_entry(Utc::now().timestamp_millis())
    }
}

/// Search text for an asset symbol: its cashtag unless the ticker needs disambiguation.
pub fn asset_query(asset: &str) -> String {
    let asset = asset.trim().to_uppercase();
    let base = match ASSET_QUERIES.get(asset.as_str()) {
        Some(query) => query.to_string(),
        None => format!("${}", asset),
    };
    format!("{} {}", base, SENTIMENT_QUERY_FILTERS)
}
