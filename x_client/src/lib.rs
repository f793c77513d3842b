mod consts;
mod error;
mod response;
mod result;
mod util;

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use consts::*;
use response::{TweetResponse, TweetsResponse, UserResponse};
use result::records_from;
pub use result::*;
pub use util::permalink;

pub use crate::error::Error;
pub use crate::error::Result;

use pulse_util::{build_params, parse_rate_limit_reset_seconds};

pub use consts::{SEARCH_MAX_RESULTS, SEARCH_MIN_RESULTS};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A raw HTTP exchange, before status handling.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Value of the `x-rate-limit-reset` header (epoch seconds), if any.
    pub rate_limit_reset: Option<String>,
    pub body: String,
}

/// The single network seam. Every call goes through `get` with the caller's bearer credential.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn get(&self, url: Url, bearer: &str) -> Result<HttpResponse>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: Url, bearer: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).bearer_auth(bearer).send().await?;
        let status = response.status().as_u16();
        let rate_limit_reset = response
            .headers()
            .get(RATE_LIMIT_RESET_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.text().await?;
        Ok(HttpResponse {
            status,
            rate_limit_reset,
            body,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Relevancy,
    Recency,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Relevancy => "relevancy",
            SortOrder::Recency => "recency",
        }
    }
}

impl Display for SortOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relevancy" => Ok(SortOrder::Relevancy),
            "recency" => Ok(SortOrder::Recency),
            _ => Err(s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub sort_order: Option<SortOrder>,
    pub start_time: Option<DateTime<Utc>>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TimelineRequest {
    pub max_results: u32,
    pub exclude_replies: bool,
    pub exclude_retweets: bool,
    pub pagination_token: Option<String>,
}

/// Raw X API v2 calls. One call per method, no pagination, no retries.
#[derive(Debug, Clone)]
pub struct XClient {
    base: String,
    transport: Arc<dyn Transport>,
}

impl XClient {
    pub fn new(transport: Arc<dyn Transport>) -> XClient {
        Self::with_base(transport, API_BASE)
    }

    pub fn with_base(transport: Arc<dyn Transport>, base: &str) -> XClient {
        XClient {
            base: base.trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub async fn search_recent(&self, token: &str, request: &SearchRequest) -> Result<Page> {
        let max_results = request.max_results.clamp(SEARCH_MIN_RESULTS, SEARCH_MAX_RESULTS);
        let sort_order = request.sort_order.map(|s| s.as_str());
        let start_time = request.start_time.map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string());
        let params = build_params! {
            required "query" => request.query,
            required "max_results" => max_results,
            optional "sort_order" => sort_order,
            optional "start_time" => start_time,
            optional "next_token" => request.next_token,
            joined "tweet.fields" => TWEET_FIELDS,
            joined "expansions" => EXPANSIONS,
            joined "user.fields" => USER_FIELDS,
        };
        let response: TweetsResponse = self.get(token, "SearchRecent", None, params).await?;
        Ok(response.into())
    }

    /// `Ok(None)` when the post does not exist or was deleted.
    pub async fn tweet_by_id(&self, token: &str, id: &str) -> Result<Option<TweetRecord>> {
        let params = build_params! {
            joined "tweet.fields" => TWEET_FIELDS,
            joined "expansions" => EXPANSIONS,
            joined "user.fields" => USER_FIELDS,
        };
        let response: TweetResponse = match self.get(token, "TweetById", Some(id), params).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(tweet) = response.data else {
            return match response.errors.iter().find(|p| !p.is_not_found()) {
                Some(problem) => Err(Error::Status {
                    status: 200,
                    body: problem.message(),
                }),
                None => Ok(None),
            };
        };
        Ok(records_from(vec![tweet], &response.includes).pop())
    }

    /// `Ok(None)` when no such user exists.
    pub async fn user_by_username(&self, token: &str, username: &str) -> Result<Option<UserProfile>> {
        let username = username.trim_start_matches('@');
        let params = build_params! {
            joined "user.fields" => USER_FIELDS,
        };
        let response: UserResponse = match self.get(token, "UserByUsername", Some(username), params).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        match response.data {
            Some(user) => Ok(Some(user.into())),
            None => match response.errors.iter().find(|p| !p.is_not_found()) {
                Some(problem) => Err(Error::Status {
                    status: 200,
                    body: problem.message(),
                }),
                None => Ok(None),
            },
        }
    }

    pub async fn user_tweets(&self, token: &str, user_id: &str, request: &TimelineRequest) -> Result<Page> {
        let max_results = request.max_results.clamp(TIMELINE_MIN_RESULTS, TIMELINE_MAX_RESULTS);
        let mut exclude = Vec::new();
        if request.exclude_replies {
            exclude.push("replies");
        }
        if request.exclude_retweets {
            exclude.push("retweets");
        }
        let params = build_params! {
            required "max_results" => max_results,
            joined "exclude" => exclude,
            optional "pagination_token" => request.pagination_token,
            joined "tweet.fields" => TWEET_FIELDS,
            joined "expansions" => EXPANSIONS,
            joined "user.fields" => USER_FIELDS,
        };
        let response: TweetsResponse = self.get(token, "UserTweets", Some(user_id), params).await?;
        Ok(response.into())
    }

    pub async fn list_tweets(
        &self,
        token: &str,
        list_id: &str,
        max_results: u32,
        pagination_token: Option<&str>,
    ) -> Result<Page> {
        let max_results = max_results.clamp(1, LIST_MAX_RESULTS);
        let params = build_params! {
            required "max_results" => max_results,
            optional "pagination_token" => pagination_token,
            joined "tweet.fields" => TWEET_FIELDS,
            joined "expansions" => EXPANSIONS,
            joined "user.fields" => USER_FIELDS,
        };
        let response: TweetsResponse = self.get(token, "ListTweets", Some(list_id), params).await?;
        Ok(response.into())
    }
}

impl XClient {
    async fn get<R>(&self, token: &str, endpoint: &str, arg: Option<&str>, params: Vec<(String, String)>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let Some(template) = ENDPOINTS.get(endpoint) else {
            return Err(Error::InvalidEndpoint(endpoint.to_string()));
        };
        let path = match arg {
            Some(arg) if is_path_safe(arg) => template.replace("{}", arg),
            Some(arg) => return Err(Error::InvalidEndpoint(format!("{} with argument `{}`", endpoint, arg))),
            None => template.to_string(),
        };
        let url = Url::parse_with_params(&format!("{}{}", self.base, path), &params)?;

        tracing::debug!("X API request {} {}", endpoint, path);
        let response = self.transport.get(url, token).await?;
        check_status(&response, Utc::now().timestamp())?;
        serde_json::from_str(&response.body).map_err(|e| e.into())
    }
}

fn check_status(response: &HttpResponse, now_epoch: i64) -> Result<()> {
    if response.status == 429 {
        let reset_epoch = response
            .rate_limit_reset
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok());
        let wait_seconds = match reset_epoch {
            Some(reset) => util::seconds_until(reset, now_epoch),
            None => parse_rate_limit_reset_seconds(&response.body),
        };
        tracing::warn!("X API returned 429, wait hint {}s", wait_seconds);
        return Err(Error::RateLimited {
            wait_seconds,
            reset_epoch,
            message: util::error_snippet(&response.body),
        });
    }
    if !(200..300).contains(&response.status) {
        return Err(Error::Status {
            status: response.status,
            body: util::error_snippet(&response.body),
        });
    }
    Ok(())
}

fn is_path_safe(arg: &str) -> bool {
    !arg.is_empty() && arg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
