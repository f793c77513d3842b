use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_with::{serde_as, VecSkipError};

#[serde_as]
#[derive(Deserialize, Debug, Default)]
pub(crate) struct TweetsResponse {
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub includes: Includes,
    pub meta: Option<Meta>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct TweetResponse {
    pub data: Option<Tweet>,
    #[serde(default)]
    pub includes: Includes,
    #[serde(default)]
    pub errors: Vec<Problem>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct UserResponse {
    pub data: Option<User>,
    #[serde(default)]
    pub errors: Vec<Problem>,
}

#[serde_as]
#[derive(Deserialize, Debug, Default)]
pub(crate) struct Includes {
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Meta {
    pub next_token: Option<String>,
    #[serde(default)]
    pub result_count: u32,
}

/// Partial errors, returned with status 200 on lookups.
#[derive(Deserialize, Debug)]
pub(crate) struct Problem {
    pub title: Option<String>,
    pub detail: Option<String>,
    #[serde(rename = "type")]
    pub problem_type: Option<String>,
}

impl Problem {
    pub fn is_not_found(&self) -> bool {
        self.title.as_deref() == Some("Not Found Error")
            || self
                .problem_type
                .as_deref()
                .is_some_and(|t| t.ends_with("resource-not-found"))
    }

    pub fn message(&self) -> String {
        self.detail
            .clone()
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Tweet {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub conversation_id: Option<String>,
    pub public_metrics: Option<TweetMetrics>,
    pub entities: Option<Entities>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub(crate) struct TweetMetrics {
    pub like_count: u64,
    pub retweet_count: u64,
    pub reply_count: u64,
    pub quote_count: u64,
    pub impression_count: u64,
    pub bookmark_count: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub(crate) struct Entities {
    pub urls: Vec<UrlEntity>,
    pub mentions: Vec<MentionEntity>,
    pub hashtags: Vec<TagEntity>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct UrlEntity {
    pub url: Option<String>,
    pub expanded_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct MentionEntity {
    pub username: String,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct TagEntity {
    pub tag: String,
}

#[derive(Deserialize, Debug, Clone)]
pub(crate) struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub public_metrics: Option<UserMetrics>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub(crate) struct UserMetrics {
    pub followers_count: u64,
    pub following_count: u64,
    pub tweet_count: u64,
}
