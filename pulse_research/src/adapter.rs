use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use chrono::Utc;
use futures::Stream;
use serde::Serialize;

use pulse_core::{Error, Result};
use pulse_util::parse_lookback;
use x_client::{
    dedupe_by_id, Page, SearchRequest, SortOrder, TimelineRequest, TweetRecord, UserProfile, XClient,
    SEARCH_MAX_RESULTS,
};

use crate::cache::{CacheKey, ResponseCache, LIST_FEED_TTL, PROFILE_TTL, SEARCH_TTL};
use crate::pacing::Pacer;
use crate::pool::{Credential, CredentialPool, RateLimitHint};
use crate::util::map_client_error;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub pages: u32,
    pub max_results: u32,
    pub sort_order: SortOrder,
    /// Lookback window, e.g. `1d`, or an RFC 3339 start time.
    pub since: Option<String>,
    /// Explicit credential for round-robin callers. Otherwise routed by query hash.
    pub credential_index: Option<usize>,
    pub cache_ttl: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            pages: 1,
            max_results: SEARCH_MAX_RESULTS,
            sort_order: SortOrder::Relevancy,
            since: None,
            credential_index: None,
            cache_ttl: SEARCH_TTL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileOptions {
    pub count: u32,
    pub include_replies: bool,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            count: 20,
            include_replies: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThreadOptions {
    pub pages: u32,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self { pages: 2 }
    }
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub max_results: u32,
    pub pages: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            max_results: 100,
            pages: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResult {
    pub user: UserProfile,
    pub records: Vec<TweetRecord>,
}

/// Logical research calls over one credential pool: pagination, pacing, caching and cooldown bookkeeping.
/// Never retries; a rate limit is recorded in the pool and returned as `Error::RateLimited`.
#[derive(Debug)]
pub struct XResearch {
    client: XClient,
    pool: Arc<CredentialPool>,
    pacer: Arc<Pacer>,
    search_cache: Arc<ResponseCache<Vec<TweetRecord>>>,
    profile_cache: Arc<ResponseCache<ProfileResult>>,
}

impl XResearch {
    pub fn new(
        client: XClient,
        pool: Arc<CredentialPool>,
        pacer: Arc<Pacer>,
        search_cache: Arc<ResponseCache<Vec<TweetRecord>>>,
        profile_cache: Arc<ResponseCache<ProfileResult>>,
    ) -> Self {
        Self {
            client,
            pool,
            pacer,
            search_cache,
            profile_cache,
        }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<TweetRecord>> {
        let query = normalize_query(query);
        let credential = self.credential(opts.credential_index, &query)?;
        let key = CacheKey::new("search")
            .part(self.pool.kind())
            .part(&query)
            .part(opts.sort_order)
            .part(opts.since.as_deref().unwrap_or("-"))
            .part(opts.pages)
            .part(opts.max_results)
            .to_string();

        let now = Utc::now();
        if let Some(hit) = self.search_cache.get(&key, now).await {
            tracing::debug!("Search cache hit: {}", key);
            return Ok((*hit).clone());
        }

        let start_time = opts.since.as_deref().map(|s| parse_lookback(s, now)).transpose()?;
        let mut records = Vec::new();
        let mut next_token: Option<String> = None;
        for page_number in 0..opts.pages.max(1) {
            let request = SearchRequest {
                query: query.clone(),
                max_results: opts.max_results,
                sort_order: Some(opts.sort_order),
                start_time,
                next_token: next_token.take(),
            };
            let page = self
                .call(&credential, move |client, token| async move {
                    client.search_recent(&token, &request).await
                })
                .await?;
            tracing::debug!("Search page {} for {}: {} records", page_number + 1, query, page.records.len());
            records.extend(page.records);
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        let records = dedupe_by_id(records);
        self.search_cache.set(&key, records.clone(), opts.cache_ttl, Utc::now()).await;
        Ok(records)
    }

    /// Pages of a search, fetched one at a time as the stream is polled. Never cached.
    /// The stream ends after `opts.pages` pages or when the results run out; call again to restart.
    pub fn search_paginated<'a>(&'a self, query: &str, opts: SearchOptions) -> impl Stream<Item = Result<Page>> + 'a {
        let query = normalize_query(query);
        try_stream! {
            let credential = self.credential(opts.credential_index, &query)?;
            let start_time = opts.since.as_deref().map(|s| parse_lookback(s, Utc::now())).transpose()?;
            let mut next_token: Option<String> = None;
            for _ in 0..opts.pages.max(1) {
                let request = SearchRequest {
                    query: query.clone(),
                    max_results: opts.max_results,
                    sort_order: Some(opts.sort_order),
                    start_time,
                    next_token: next_token.take(),
                };
                let page = self
                    .call(&credential, move |client, token| async move {
                        client.search_recent(&token, &request).await
                    })
                    .await?;
                next_token = page.next_token.clone();
                let done = next_token.is_none();
                yield page;
                if done {
                    break;
                }
            }
        }
    }

    /// User lookup, then the user's timeline. Falls back to an author-scoped search
    /// when the credential cannot read timelines.
    pub async fn profile(&self, handle: &str, opts: &ProfileOptions) -> Result<Option<Arc<ProfileResult>>> {
        let handle = handle.trim().trim_start_matches('@').to_string();
        let key = CacheKey::new("profile")
            .part(self.pool.kind())
            .part(handle.to_lowercase())
            .part(opts.count)
            .part(opts.include_replies)
            .to_string();
        if let Some(hit) = self.profile_cache.get(&key, Utc::now()).await {
            tracing::debug!("Profile cache hit: {}", key);
            return Ok(Some(hit));
        }

        let credential = self.credential(None, &handle)?;
        let lookup = handle.clone();
        let user = self
            .call(&credential, move |client, token| async move {
                client.user_by_username(&token, &lookup).await
            })
            .await?;
        let Some(user) = user else {
            return Ok(None);
        };

        let request = TimelineRequest {
            max_results: opts.count,
            exclude_replies: !opts.include_replies,
            exclude_retweets: true,
            pagination_token: None,
        };
        let user_id = user.id.clone();
        let timeline = self
            .call(&credential, move |client, token| async move {
                match client.user_tweets(&token, &user_id, &request).await {
                    Ok(page) => Ok(Some(page)),
                    Err(e) if e.is_forbidden() => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await?;

        let records = match timeline {
            Some(page) => page.records,
            None => {
                tracing::debug!("Timeline unavailable for @{}, searching by author", user.handle);
                let mut query = format!("from:{} -is:retweet", user.handle);
                if !opts.include_replies {
                    query.push_str(" -is:reply");
                }
                let search_opts = SearchOptions {
                    max_results: opts.count,
                    sort_order: SortOrder::Recency,
                    credential_index: Some(credential.index),
                    cache_ttl: PROFILE_TTL,
                    ..Default::default()
                };
                self.search(&query, &search_opts).await?
            }
        };

        let result = ProfileResult {
            user,
            records: dedupe_by_id(records),
        };
        Ok(Some(self.profile_cache.set(&key, result, PROFILE_TTL, Utc::now()).await))
    }

    /// Conversation search plus the root post. A missing or deleted root is skipped.
    pub async fn thread(&self, id: &str, opts: &ThreadOptions) -> Result<Vec<TweetRecord>> {
        let search_opts = SearchOptions {
            pages: opts.pages,
            sort_order: SortOrder::Recency,
            ..Default::default()
        };
        let mut records = self.search(&format!("conversation_id:{}", id), &search_opts).await?;

        match self.get_item(id).await {
            Ok(Some(root)) => {
                if !records.iter().any(|r| r.id == root.id) {
                    records.insert(0, root);
                }
            }
            Ok(None) => tracing::debug!("Thread root {} not found", id),
            Err(e) => tracing::debug!("Thread root {} lookup failed: {}", id, e),
        }
        Ok(records)
    }

    /// A single post, or `None` when it does not exist.
    pub async fn get_item(&self, id: &str) -> Result<Option<TweetRecord>> {
        let credential = self.credential(None, id)?;
        let id = id.to_string();
        self.call(&credential, move |client, token| async move {
            client.tweet_by_id(&token, &id).await
        })
        .await
    }

    pub async fn get_list_feed(&self, list_id: &str, opts: &ListOptions) -> Result<Vec<TweetRecord>> {
        let key = CacheKey::new("list")
            .part(self.pool.kind())
            .part(list_id)
            .part(opts.max_results)
            .part(opts.pages)
            .to_string();
        if let Some(hit) = self.search_cache.get(&key, Utc::now()).await {
            tracing::debug!("List cache hit: {}", key);
            return Ok((*hit).clone());
        }

        let credential = self.credential(None, list_id)?;
        let mut records = Vec::new();
        let mut pagination_token: Option<String> = None;
        for _ in 0..opts.pages.max(1) {
            let list_id = list_id.to_string();
            let max_results = opts.max_results;
            let token_in = pagination_token.take();
            let page = self
                .call(&credential, move |client, token| async move {
                    client
                        .list_tweets(&token, &list_id, max_results, token_in.as_deref())
                        .await
                })
                .await?;
            records.extend(page.records);
            match page.next_token {
                Some(token) => pagination_token = Some(token),
                None => break,
            }
        }

        let records = dedupe_by_id(records);
        self.search_cache.set(&key, records.clone(), LIST_FEED_TTL, Utc::now()).await;
        Ok(records)
    }
}

impl XResearch {
    fn credential(&self, index: Option<usize>, query: &str) -> Result<Arc<Credential>> {
        self.pool
            .select(index, query)
            .ok_or_else(|| Error::NotConfigured(format!("no {} X credential", self.pool.kind())))
    }

    /// One network call: cooldown check, pacing, then cooldown bookkeeping on the outcome.
    async fn call<R, F, Fut>(&self, credential: &Credential, f: F) -> Result<R>
    where
        F: FnOnce(XClient, String) -> Fut,
        Fut: Future<Output = x_client::Result<R>>,
    {
        let seen = self.pool.ensure_available(credential, Utc::now())?;
        self.pacer.wait_turn(&credential.key).await;

        match f(self.client.clone(), credential.token().to_string()).await {
            Ok(result) => {
                self.pool.on_success(credential, seen);
                Ok(result)
            }
            Err(e @ x_client::Error::RateLimited { .. }) => {
                let wait_seconds = self.pool.on_rate_limited(credential, &RateLimitHint::from(&e), Utc::now());
                Err(Error::RateLimited { wait_seconds })
            }
            Err(e) => Err(map_client_error(e)),
        }
    }
}

/// Retweets are excluded unless the query already says something about them.
pub fn normalize_query(query: &str) -> String {
    let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.contains("is:retweet") {
        query
    } else {
        format!("{} -is:retweet", query)
    }
}
