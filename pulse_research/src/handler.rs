use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::{pin_mut, StreamExt};
use serde::Serialize;

use pulse_core::{Error, Result, Settings};
use x_client::{dedupe_by_id, sort_by_engagement, EngagementMetric, TweetRecord};

use crate::adapter::{ListOptions, ProfileOptions, SearchOptions, ThreadOptions, XResearch};
use crate::cache::{CacheKey, ResponseCache, RANKED_TTL};
use crate::format::{
    format_briefing, format_item, format_list_sentiment, format_profile, format_sentiment, format_thread,
};
use crate::intent::{parse_intent, Intent};
use crate::sentiment::SentimentService;
use crate::util::retry_transport;

pub const DEEP_SEARCH_PAGES: u32 = 3;

pub const USAGE_TEXT: &str = "I can search X for you. Try \"search x for <topic>\", \"@handle recent\", \
\"thread <post id>\" or \"BTC sentiment\".";
pub const NOT_CONFIGURED_TEXT: &str =
    "X research isn't configured (set X_BEARER_TOKEN, and optionally X_BEARER_TOKEN_BACKGROUND for background work).";
const BACKGROUND_POOL_TIP: &str =
    " Tip: set X_BEARER_TOKEN_BACKGROUND so background refreshes stop competing with your requests.";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<&'static str>,
}

impl Reply {
    fn success(intent: &Intent, text: String) -> Self {
        Self {
            text,
            success: true,
            intent: Some(intent.name()),
        }
    }

    fn failure(intent: Option<&Intent>, text: String) -> Self {
        Self {
            text,
            success: false,
            intent: intent.map(Intent::name),
        }
    }
}

/// Answers free-text research requests. Every outcome, errors included, becomes a [`Reply`].
#[derive(Debug)]
pub struct ResearchHandler {
    settings: Arc<Settings>,
    research: Option<Arc<XResearch>>,
    sentiment: Arc<SentimentService>,
    ranked_cache: ResponseCache<String>,
}

impl ResearchHandler {
    /// `research` is the foreground adapter.
    pub fn new(settings: Arc<Settings>, research: Option<Arc<XResearch>>, sentiment: Arc<SentimentService>) -> Self {
        Self {
            settings,
            research,
            sentiment,
            ranked_cache: ResponseCache::new(),
        }
    }

    pub async fn handle(&self, text: &str) -> Reply {
        let Some(intent) = parse_intent(text, &self.settings.assets) else {
            return Reply::failure(None, USAGE_TEXT.to_string());
        };
        tracing::debug!("Research intent: {:?}", intent);

        match &intent {
            Intent::Sentiment { asset } => {
                let reading = self.sentiment.get_sentiment(asset);
                return Reply::success(&intent, format_sentiment(asset, &reading));
            }
            Intent::ListSentiment if self.settings.list_id.is_none() => {
                return Reply::failure(Some(&intent), "No curated list is set (X_LIST_ID).".to_string());
            }
            Intent::ListSentiment => {
                let reading = self.sentiment.list_sentiment().await;
                return Reply::success(&intent, format_list_sentiment(&reading));
            }
            _ => {}
        }

        let Some(research) = &self.research else {
            return Reply::failure(Some(&intent), NOT_CONFIGURED_TEXT.to_string());
        };
        match self.run(research, &intent).await {
            Ok(text) => Reply::success(&intent, text),
            Err(e) => {
                tracing::warn!("X research for {:?} failed: {}", intent, e);
                Reply::failure(Some(&intent), self.error_text(&e))
            }
        }
    }

    async fn run(&self, research: &XResearch, intent: &Intent) -> Result<String> {
        match intent {
            Intent::Search { query, deep, metric } => self.search(research, query, *deep, *metric).await,
            Intent::Profile { handle } => {
                let opts = ProfileOptions::default();
                match retry_transport(|| research.profile(handle, &opts)).await? {
                    Some(result) => Ok(format_profile(&result)),
                    None => Ok(format!("No X account found for @{}.", handle)),
                }
            }
            Intent::Thread { id } => {
                let opts = ThreadOptions::default();
                let records = retry_transport(|| research.thread(id, &opts)).await?;
                Ok(format_thread(id, &records))
            }
            Intent::Item { id } => match retry_transport(|| research.get_item(id)).await? {
                Some(record) => Ok(format_item(&record)),
                None => Ok(format!("Post {} was not found. It may have been deleted.", id)),
            },
            Intent::Sentiment { .. } | Intent::ListSentiment => Ok(USAGE_TEXT.to_string()),
        }
    }

    async fn search(&self, research: &XResearch, query: &str, deep: bool, metric: EngagementMetric) -> Result<String> {
        let key = CacheKey::new("ranked")
            .part(query.to_lowercase())
            .part(deep)
            .part(format!("{:?}", metric))
            .to_string();
        if let Some(hit) = self.ranked_cache.get(&key, Utc::now()).await {
            return Ok((*hit).clone());
        }

        let mut records = if deep {
            retry_transport(|| deep_search(research, query)).await?
        } else {
            let opts = SearchOptions::default();
            retry_transport(|| research.search(query, &opts)).await?
        };
        sort_by_engagement(&mut records, metric);
        let curated = self.curated_handles(research).await;
        prioritize_curated(&mut records, &curated);

        let text = format_briefing(query, &records);
        self.ranked_cache.set(&key, text.clone(), RANKED_TTL, Utc::now()).await;
        Ok(text)
    }

    /// Lowercased author handles from the curated list feed; empty when there is no list.
    async fn curated_handles(&self, research: &XResearch) -> HashSet<String> {
        let Some(list_id) = &self.settings.list_id else {
            return HashSet::new();
        };
        match research.get_list_feed(list_id, &ListOptions::default()).await {
            Ok(records) => records
                .iter()
                .filter_map(|r| r.author_handle.as_deref())
                .map(str::to_lowercase)
                .collect(),
            Err(e) => {
                tracing::debug!("Curated list {} unavailable: {}", list_id, e);
                HashSet::new()
            }
        }
    }

    fn error_text(&self, err: &Error) -> String {
        match err {
            Error::RateLimited { wait_seconds } => {
                let mut text = format!("X API is rate limited right now, try again in {}s.", wait_seconds);
                if !self.settings.has_background_pool() {
                    text.push_str(BACKGROUND_POOL_TIP);
                }
                text
            }
            Error::NotConfigured(_) => NOT_CONFIGURED_TEXT.to_string(),
            other => format!("X search failed: {}. Try again in a moment or narrow the query.", other),
        }
    }
}

async fn deep_search(research: &XResearch, query: &str) -> Result<Vec<TweetRecord>> {
    let opts = SearchOptions {
        pages: DEEP_SEARCH_PAGES,
        ..Default::default()
    };
    let pages = research.search_paginated(query, opts);
    pin_mut!(pages);
    let mut records = Vec::new();
    while let Some(page) = pages.next().await {
        records.extend(page?.records);
    }
    Ok(dedupe_by_id(records))
}

/// Stable partition: posts by curated authors first, each group keeps its order.
pub fn prioritize_curated(records: &mut [TweetRecord], curated: &HashSet<String>) {
    if curated.is_empty() {
        return;
    }
    records.sort_by_key(|r| {
        let is_curated = r
            .author_handle
            .as_deref()
            .map(|h| curated.contains(&h.to_lowercase()))
            .unwrap_or(false);
        !is_curated
    });
}
