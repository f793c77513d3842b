use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use serde_json::{json, Value};
use url::Url;

use pulse_core::persist::{load_sentiment_file, merge_sentiment_entry};
use pulse_core::store::{CooldownKey, MemoryRateLimitStore, PoolKind, RateLimitStore};
use pulse_core::{Error, SentimentEntry, SentimentLabel, Settings};
use x_client::{HttpResponse, Transport};

use crate::adapter::{ProfileOptions, SearchOptions, ThreadOptions};
use crate::sentiment::{SentimentService, TickOutcome};
use crate::Engine;

const SEARCH: &str = "/tweets/search/recent";

/// Canned responses per API path, served in order.
#[derive(Debug, Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<Url>>,
}

impl FakeTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, path: &str, status: u16, body: impl Into<String>) {
        self.push_response(
            path,
            HttpResponse {
                status,
                rate_limit_reset: None,
                body: body.into(),
            },
        );
    }

    fn push_rate_limit(&self, path: &str, reset_in_seconds: i64) {
        self.push_response(
            path,
            HttpResponse {
                status: 429,
                rate_limit_reset: Some((Utc::now().timestamp() + reset_in_seconds).to_string()),
                body: r#"{"title":"Too Many Requests"}"#.to_string(),
            },
        );
    }

    fn push_response(&self, path: &str, response: HttpResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    fn requests(&self) -> Vec<Url> {
        self.requests.lock().unwrap().clone()
    }

    fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|url| api_path(url) == path).count()
    }
}

fn api_path(url: &Url) -> String {
    url.path().trim_start_matches("/2").to_string()
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.to_string())
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: Url, _bearer: &str) -> x_client::Result<HttpResponse> {
        let path = api_path(&url);
        self.requests.lock().unwrap().push(url);
        let response = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(|queue| queue.pop_front());
        Ok(response.unwrap_or(HttpResponse {
            status: 500,
            rate_limit_reset: None,
            body: format!("no fake response for {}", path),
        }))
    }
}

fn temp_cache_path(name: &str) -> PathBuf {
    let nonce = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    std::env::temp_dir().join(format!("pulse-research-{}-{}.json", nonce, name))
}

fn settings(name: &str, pairs: &[(&str, &str)]) -> Settings {
    let cache_path = temp_cache_path(name).to_string_lossy().to_string();
    let mut map: HashMap<String, String> = HashMap::from([
        ("X_BEARER_TOKEN".to_string(), "fg-token".to_string()),
        ("X_MIN_CALL_INTERVAL_MS".to_string(), "0".to_string()),
        ("X_SENTIMENT_ASSETS".to_string(), "BTC,ETH".to_string()),
        ("X_SENTIMENT_CACHE_PATH".to_string(), cache_path),
    ]);
    for (key, value) in pairs {
        map.insert(key.to_string(), value.to_string());
    }
    Settings::from_lookup(|key| map.get(key).cloned()).unwrap()
}

fn engine(settings: Settings, transport: &Arc<FakeTransport>) -> (Engine, Arc<MemoryRateLimitStore>) {
    let store = Arc::new(MemoryRateLimitStore::new());
    let engine = Engine::build_with_transport(settings, store.clone(), transport.clone());
    (engine, store)
}

fn tweet(id: &str, text: &str, author_id: &str, likes: u64) -> Value {
    json!({
        "id": id,
        "text": text,
        "author_id": author_id,
        "conversation_id": "100",
        "created_at": "2024-05-10T12:00:00.000Z",
        "public_metrics": {"retweet_count": 1, "reply_count": 0, "like_count": likes, "quote_count": 0, "bookmark_count": 0, "impression_count": likes * 10}
    })
}

fn page(tweets: Vec<Value>, next_token: Option<&str>) -> String {
    let mut meta = json!({"result_count": tweets.len()});
    if let Some(token) = next_token {
        meta["next_token"] = json!(token);
    }
    json!({
        "data": tweets,
        "includes": {"users": [
            {"id": "42", "username": "alice", "name": "Alice", "public_metrics": {"followers_count": 1000, "following_count": 1, "tweet_count": 10, "listed_count": 0}},
            {"id": "43", "username": "bob", "name": "Bob", "public_metrics": {"followers_count": 5, "following_count": 1, "tweet_count": 10, "listed_count": 0}}
        ]},
        "meta": meta
    })
    .to_string()
}

fn bullish_page() -> String {
    page(
        vec![
            tweet("1", "bullish on this, moon soon", "42", 10),
            tweet("2", "buy the dip", "42", 10),
            tweet("3", "rally and breakout", "43", 10),
            tweet("4", "accumulate here", "43", 10),
        ],
        None,
    )
}

// MARK: Adapter

#[tokio::test]
async fn test_search_excludes_retweets_and_caches() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, bullish_page());
    let (engine, _) = engine(settings("search", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    let records = research.search("btc   news", &SearchOptions::default()).await.unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].author_handle.as_deref(), Some("alice"));
    assert_eq!(records[0].permalink, "https://x.com/alice/status/1");
    let url = &transport.requests()[0];
    assert_eq!(query_param(url, "query").as_deref(), Some("btc news -is:retweet"));

    let again = research.search("btc news", &SearchOptions::default()).await.unwrap();
    assert_eq!(again, records);
    assert_eq!(transport.count(SEARCH), 1);
}

#[tokio::test]
async fn test_search_paginates_and_dedupes() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, page(vec![tweet("1", "a", "42", 1), tweet("2", "b", "42", 1)], Some("next-2")));
    transport.push(SEARCH, 200, page(vec![tweet("2", "b", "42", 1), tweet("3", "c", "43", 1)], None));
    let (engine, _) = engine(settings("paginate", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    let opts = SearchOptions {
        pages: 5,
        ..Default::default()
    };
    let records = research.search("sol -is:retweet", &opts).await.unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(query_param(&requests[0], "query").as_deref(), Some("sol -is:retweet"));
    assert_eq!(query_param(&requests[1], "next_token").as_deref(), Some("next-2"));
}

#[tokio::test]
async fn test_search_paginated_stream() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, page(vec![tweet("1", "a", "42", 1)], Some("t2")));
    transport.push(SEARCH, 200, page(vec![tweet("2", "b", "42", 1)], Some("t3")));
    let (engine, _) = engine(settings("stream", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    let opts = SearchOptions {
        pages: 2,
        ..Default::default()
    };
    let pages: Vec<_> = research.search_paginated("eth", opts).collect().await;
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[1].as_ref().unwrap().records[0].id, "2");
    assert_eq!(transport.count(SEARCH), 2);
}

#[tokio::test]
async fn test_rate_limit_fails_fast() {
    let transport = FakeTransport::new();
    transport.push_rate_limit(SEARCH, 120);
    let (engine, store) = engine(settings("ratelimit", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    let err = research.search("btc", &SearchOptions::default()).await.unwrap_err();
    let wait = err.wait_seconds().unwrap();
    assert!((110..=121).contains(&wait), "wait was {}", wait);
    assert!(store.get(&CooldownKey::new(PoolKind::Foreground, 0)).unwrap().is_some());

    // Cooling credential: no request is made at all
    let err = research.search("eth", &SearchOptions::default()).await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_thread_merges_root() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, page(vec![tweet("101", "reply one", "43", 1), tweet("102", "reply two", "43", 1)], None));
    transport.push(
        "/tweets/100",
        200,
        json!({"data": tweet("100", "root post", "42", 50), "includes": {"users": [{"id": "42", "username": "alice", "name": "Alice"}]}})
            .to_string(),
    );
    let (engine, _) = engine(settings("thread", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    let records = research.thread("100", &ThreadOptions::default()).await.unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["100", "101", "102"]);
    assert_eq!(
        query_param(&transport.requests()[0], "query").as_deref(),
        Some("conversation_id:100 -is:retweet")
    );
}

#[tokio::test]
async fn test_thread_tolerates_missing_root() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, page(vec![tweet("101", "reply one", "43", 1)], None));
    transport.push("/tweets/100", 404, r#"{"title":"Not Found Error"}"#);
    let (engine, _) = engine(settings("thread-missing", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    let records = research.thread("100", &ThreadOptions::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "101");
}

#[tokio::test]
async fn test_get_item_missing_is_none() {
    let transport = FakeTransport::new();
    transport.push("/tweets/555555", 404, r#"{"title":"Not Found Error"}"#);
    let (engine, _) = engine(settings("item", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    assert_eq!(research.get_item("555555").await.unwrap(), None);
}

#[tokio::test]
async fn test_profile_falls_back_to_author_search() {
    let transport = FakeTransport::new();
    transport.push(
        "/users/by/username/alice",
        200,
        json!({"data": {"id": "42", "username": "alice", "name": "Alice", "public_metrics": {"followers_count": 1000, "following_count": 1, "tweet_count": 10, "listed_count": 0}}})
            .to_string(),
    );
    transport.push("/users/42/tweets", 403, r#"{"title":"Forbidden"}"#);
    transport.push(SEARCH, 200, page(vec![tweet("7", "gm", "42", 3)], None));
    let (engine, _) = engine(settings("profile", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    let result = research.profile("@alice", &ProfileOptions::default()).await.unwrap().unwrap();
    assert_eq!(result.user.handle, "alice");
    assert_eq!(result.user.followers, 1000);
    assert_eq!(result.records.len(), 1);
    let search = transport.requests().into_iter().find(|url| api_path(url) == SEARCH).unwrap();
    assert_eq!(
        query_param(&search, "query").as_deref(),
        Some("from:alice -is:retweet -is:reply")
    );
    assert_eq!(query_param(&search, "sort_order").as_deref(), Some("recency"));
}

#[tokio::test]
async fn test_unknown_profile_is_none() {
    let transport = FakeTransport::new();
    transport.push("/users/by/username/nobody", 404, r#"{"title":"Not Found Error"}"#);
    let (engine, _) = engine(settings("profile-missing", &[]), &transport);
    let research = engine.foreground.clone().unwrap();

    assert!(research.profile("nobody", &ProfileOptions::default()).await.unwrap().is_none());
}

// MARK: Sentiment

fn entry(label: SentimentLabel, confidence: u8, updated_at: i64) -> SentimentEntry {
    SentimentEntry {
        sentiment: label,
        confidence,
        risk_flag: false,
        updated_at,
        contrarian: false,
        contrarian_note: None,
        sample_size: Some(10),
    }
}

#[tokio::test]
async fn test_unrefreshed_and_stale_read_neutral() {
    let service = SentimentService::new(Arc::new(settings("neutral", &[("X_BEARER_TOKEN", "")])), None);
    assert!(!service.is_configured());

    let reading = service.get_sentiment("BTC");
    assert_eq!(reading.sentiment, SentimentLabel::Neutral);
    assert_eq!(reading.confidence, 0);
    assert!(!reading.risk_flag);

    let now = Utc::now();
    service.insert_entry("btc", entry(SentimentLabel::Bullish, 80, (now - ChronoDuration::hours(25)).timestamp_millis()));
    assert_eq!(service.get_sentiment_at("BTC", now).confidence, 0);

    service.insert_entry("btc", entry(SentimentLabel::Bullish, 80, (now - ChronoDuration::hours(1)).timestamp_millis()));
    let reading = service.get_sentiment_at("BTC", now);
    assert_eq!(reading.sentiment, SentimentLabel::Bullish);
    assert_eq!(reading.confidence, 80);

    assert_eq!(service.tick().await, TickOutcome::NotConfigured);
}

#[tokio::test]
async fn test_disabled_tick() {
    let transport = FakeTransport::new();
    let (engine, _) = engine(settings("disabled", &[("X_SENTIMENT_ENABLED", "false")]), &transport);
    assert_eq!(engine.sentiment.tick().await, TickOutcome::Disabled);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_tick_refreshes_and_persists() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, bullish_page());
    let settings = settings("persist", &[]);
    let cache_path = settings.cache_path.clone();
    let (engine, _) = engine(settings.clone(), &transport);

    let TickOutcome::Refreshed { asset, entry } = engine.sentiment.tick().await else {
        panic!("expected a refresh");
    };
    assert_eq!(asset, "BTC");
    assert_eq!(entry.sentiment, SentimentLabel::Bullish);
    assert!(entry.confidence > 0);
    assert_eq!(
        query_param(&transport.requests()[0], "query").as_deref(),
        Some("$BTC lang:en -is:retweet -is:reply")
    );

    // A fresh process reads the same value from disk
    let reloaded = SentimentService::new(Arc::new(settings), None);
    assert_eq!(reloaded.get_sentiment("BTC"), engine.sentiment.get_sentiment("BTC"));
    assert_eq!(reloaded.get_sentiment("ETH").confidence, 0);
    let _ = std::fs::remove_file(cache_path);
}

#[tokio::test]
async fn test_tick_keeps_entries_written_by_other_processes() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, bullish_page());
    let settings = settings("shared-file", &[]);
    let cache_path = settings.cache_path.clone();
    let (engine, _) = engine(settings, &transport);

    let now = Utc::now();
    let fresh = now.timestamp_millis();
    let older = (now - ChronoDuration::hours(2)).timestamp_millis();
    engine.sentiment.insert_entry("ETH", entry(SentimentLabel::Bullish, 64, fresh));

    // Written by a one-shot refresher while the server is running
    merge_sentiment_entry(&cache_path, "SOL", entry(SentimentLabel::Bearish, 55, fresh))
        .await
        .unwrap();
    merge_sentiment_entry(&cache_path, "ETH", entry(SentimentLabel::Bearish, 20, older))
        .await
        .unwrap();

    let TickOutcome::Refreshed { asset, .. } = engine.sentiment.tick().await else {
        panic!("expected a refresh");
    };
    assert_eq!(asset, "BTC");

    let on_disk = load_sentiment_file(&cache_path).unwrap();
    assert_eq!(on_disk.keys().cloned().collect::<Vec<_>>(), vec!["BTC", "ETH", "SOL"]);
    assert_eq!(on_disk["ETH"].confidence, 64);
    assert_eq!(on_disk["SOL"].sentiment, SentimentLabel::Bearish);

    let sol = engine.sentiment.get_sentiment("SOL");
    assert_eq!(sol.sentiment, SentimentLabel::Bearish);
    assert_eq!(sol.confidence, 55);
    assert_eq!(engine.sentiment.get_sentiment("ETH").sentiment, SentimentLabel::Bullish);
    let _ = std::fs::remove_file(cache_path);
}

#[tokio::test]
async fn test_tick_skips_cooling_credential() {
    let transport = FakeTransport::new();
    let (engine, store) = engine(settings("skip", &[]), &transport);
    store
        .set(&CooldownKey::new(PoolKind::Foreground, 0), Utc::now() + ChronoDuration::minutes(10))
        .unwrap();

    let outcome = engine.sentiment.tick().await;
    assert!(matches!(outcome, TickOutcome::Skipped { ref asset, wait_seconds } if asset == "BTC" && wait_seconds > 500));
    assert!(transport.requests().is_empty());

    // The cursor still moves on
    let outcome = engine.sentiment.tick().await;
    assert!(matches!(outcome, TickOutcome::Skipped { ref asset, .. } if asset == "ETH"));
}

#[tokio::test]
async fn test_tick_rate_limited_mid_refresh() {
    let transport = FakeTransport::new();
    transport.push_rate_limit(SEARCH, 300);
    let (engine, _) = engine(settings("tick-429", &[]), &transport);

    let outcome = engine.sentiment.tick().await;
    assert!(matches!(outcome, TickOutcome::RateLimited { ref asset, .. } if asset == "BTC"));
    assert!(engine.sentiment.local_watermark().is_some());
    assert!(engine.sentiment.status().cooldown_until.is_some());

    let outcome = engine.sentiment.tick().await;
    assert!(matches!(outcome, TickOutcome::Skipped { ref asset, .. } if asset == "ETH"));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_tick_failure_moves_on() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 503, "upstream unavailable");
    transport.push(SEARCH, 200, bullish_page());
    let (engine, _) = engine(settings("tick-fail", &[]), &transport);

    let outcome = engine.sentiment.tick().await;
    assert!(matches!(outcome, TickOutcome::Failed { ref asset, .. } if asset == "BTC"));
    assert_eq!(engine.sentiment.get_sentiment("BTC").confidence, 0);

    let outcome = engine.sentiment.tick().await;
    assert!(matches!(outcome, TickOutcome::Refreshed { ref asset, .. } if asset == "ETH"));
}

#[tokio::test]
async fn test_engagement_filters() {
    let transport = FakeTransport::new();
    transport.push(
        SEARCH,
        200,
        page(
            vec![
                tweet("1", "bullish, moon", "42", 20),
                tweet("2", "buy the dip", "42", 20),
                tweet("3", "accumulate", "42", 20),
                tweet("4", "dump it, bearish", "43", 0),
                tweet("5", "crash incoming, sell", "43", 0),
                tweet("6", "bearish top", "43", 0),
                tweet("7", "sell everything", "43", 0),
            ],
            None,
        ),
    );
    let (engine, _) = engine(
        settings("filters", &[("X_SENTIMENT_MIN_LIKES", "5"), ("X_SENTIMENT_MIN_FOLLOWERS", "100")]),
        &transport,
    );

    let entry = engine.sentiment.refresh_asset("btc", None).await.unwrap();
    assert_eq!(entry.sentiment, SentimentLabel::Bullish);
    assert_eq!(entry.sample_size, Some(3));
}

#[tokio::test]
async fn test_score_asset_does_not_store() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, bullish_page());
    let (engine, _) = engine(settings("score-only", &[]), &transport);

    let entry = engine.sentiment.score_asset("HYPE", Some(0)).await.unwrap();
    assert_eq!(entry.sentiment, SentimentLabel::Bullish);
    assert_eq!(engine.sentiment.get_sentiment("HYPE").confidence, 0);
    assert_eq!(
        query_param(&transport.requests()[0], "query").as_deref(),
        Some("HYPE crypto lang:en -is:retweet -is:reply")
    );
}

// MARK: Handler

#[tokio::test]
async fn test_handler_search_briefing() {
    let transport = FakeTransport::new();
    transport.push(SEARCH, 200, bullish_page());
    let (engine, _) = engine(settings("handler-search", &[]), &transport);

    let reply = engine.handler.handle("search x for btc").await;
    assert!(reply.success, "{}", reply.text);
    assert_eq!(reply.intent, Some("search"));
    assert!(reply.text.starts_with("**X research: btc**"));
    assert!(reply.text.contains("[Tweet](https://x.com/alice/status/1)"));
    assert!(reply.text.ends_with("_Source: X API (read-only, last 7 days)._"));
}

#[tokio::test]
async fn test_handler_prioritizes_curated_authors() {
    let transport = FakeTransport::new();
    transport.push(
        SEARCH,
        200,
        page(vec![tweet("1", "big post", "42", 500), tweet("2", "small post", "43", 1)], None),
    );
    transport.push("/lists/999/tweets", 200, page(vec![tweet("9", "list post", "43", 1)], None));
    let (engine, _) = engine(settings("handler-curated", &[("X_LIST_ID", "999")]), &transport);

    let reply = engine.handler.handle("what are people saying about sol").await;
    assert!(reply.success, "{}", reply.text);
    let bob = reply.text.find("@bob").unwrap();
    let alice = reply.text.find("@alice").unwrap();
    assert!(bob < alice);
}

#[tokio::test]
async fn test_handler_errors_are_replies() {
    let transport = FakeTransport::new();
    transport.push_rate_limit(SEARCH, 90);
    let (engine, _) = engine(settings("handler-errors", &[]), &transport);

    let reply = engine.handler.handle("search x for eth").await;
    assert!(!reply.success);
    assert!(reply.text.contains("try again in"));
    assert!(reply.text.contains("X_BEARER_TOKEN_BACKGROUND"));

    let reply = engine.handler.handle("hello there").await;
    assert!(!reply.success);
    assert_eq!(reply.intent, None);
}

#[tokio::test]
async fn test_handler_not_configured() {
    let transport = FakeTransport::new();
    let (engine, _) = engine(settings("handler-unconfigured", &[("X_BEARER_TOKEN", "")]), &transport);
    assert!(engine.foreground.is_none());

    let reply = engine.handler.handle("search x for btc").await;
    assert!(!reply.success);
    assert!(reply.text.contains("isn't configured"));

    // Sentiment still answers, neutral
    let reply = engine.handler.handle("btc sentiment").await;
    assert!(reply.success);
    assert!(reply.text.contains("neutral"));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_handler_sentiment_reads_service() {
    let transport = FakeTransport::new();
    let (engine, _) = engine(settings("handler-sentiment", &[]), &transport);
    engine
        .sentiment
        .insert_entry("ETH", entry(SentimentLabel::Bearish, 64, Utc::now().timestamp_millis()));

    let reply = engine.handler.handle("what's the vibe on $eth").await;
    assert_eq!(reply.intent, Some("sentiment"));
    assert!(reply.text.contains("bearish (64% confidence)"));
}

#[test]
fn test_rate_limit_error_maps() {
    let err = Error::RateLimited { wait_seconds: 30 };
    assert_eq!(err.to_string(), "X API rate limited. Resets in 30s");
}
