use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::response::{self, Includes};
use crate::util::permalink;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngagementMetrics {
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    pub quotes: u64,
    pub impressions: u64,
    pub bookmarks: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedEntities {
    pub urls: Vec<String>,
    pub mentions: Vec<String>,
    pub hashtags: Vec<String>,
}

/// A post, normalized from the wire format with its author joined in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TweetRecord {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub author_handle: Option<String>,
    pub author_name: Option<String>,
    pub author_followers: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub conversation_id: Option<String>,
    pub metrics: EngagementMetrics,
    pub entities: ExtractedEntities,
    pub permalink: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub handle: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub followers: u64,
    pub following: u64,
    pub tweet_count: u64,
}

/// One page of results and the token for the next one.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<TweetRecord>,
    pub next_token: Option<String>,
    pub result_count: u32,
}

impl From<response::User> for UserProfile {
    fn from(user: response::User) -> Self {
        let metrics = user.public_metrics.unwrap_or_default();
        Self {
            id: user.id,
            handle: user.username,
            name: user.name,
            description: user.description.filter(|d| !d.is_empty()),
            created_at: user.created_at,
            followers: metrics.followers_count,
            following: metrics.following_count,
            tweet_count: metrics.tweet_count,
        }
    }
}

impl From<response::TweetsResponse> for Page {
    fn from(response: response::TweetsResponse) -> Self {
        let meta = response.meta.unwrap_or_default();
        Self {
            records: records_from(response.data, &response.includes),
            next_token: meta.next_token.filter(|t| !t.is_empty()),
            result_count: meta.result_count,
        }
    }
}

pub(crate) fn records_from(tweets: Vec<response::Tweet>, includes: &Includes) -> Vec<TweetRecord> {
    let users: HashMap<&str, &response::User> = includes.users.iter().map(|u| (u.id.as_str(), u)).collect();
    tweets
        .into_iter()
        .map(|tweet| {
            let author = tweet.author_id.as_deref().and_then(|id| users.get(id).copied());
            record_from(tweet, author)
        })
        .collect()
}

fn record_from(tweet: response::Tweet, author: Option<&response::User>) -> TweetRecord {
    let metrics = tweet.public_metrics.unwrap_or_default();
    let entities = tweet.entities.unwrap_or_default();
    let author_handle = author.map(|u| u.username.clone());
    TweetRecord {
        permalink: permalink(author_handle.as_deref(), &tweet.id),
        id: tweet.id,
        text: tweet.text,
        author_id: tweet.author_id,
        author_handle,
        author_name: author.map(|u| u.name.clone()),
        author_followers: author
            .and_then(|u| u.public_metrics.as_ref())
            .map(|m| m.followers_count)
            .unwrap_or(0),
        created_at: tweet.created_at,
        conversation_id: tweet.conversation_id,
        metrics: EngagementMetrics {
            likes: metrics.like_count,
            retweets: metrics.retweet_count,
            replies: metrics.reply_count,
            quotes: metrics.quote_count,
            impressions: metrics.impression_count,
            bookmarks: metrics.bookmark_count,
        },
        entities: ExtractedEntities {
            urls: entities
                .urls
                .into_iter()
                .filter_map(|u| u.expanded_url.or(u.url))
                .collect(),
            mentions: entities.mentions.into_iter().map(|m| m.username).collect(),
            hashtags: entities.hashtags.into_iter().map(|h| h.tag).collect(),
        },
    }
}

// MARK: Record helpers

/// Keep the first record for each id. Applying it twice changes nothing.
pub fn dedupe_by_id(records: Vec<TweetRecord>) -> Vec<TweetRecord> {
    let mut seen = HashSet::new();
    records.into_iter().filter(|r| seen.insert(r.id.clone())).collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngagementMetric {
    #[default]
    Likes,
    Impressions,
    Retweets,
    Replies,
}

impl EngagementMetric {
    pub fn value(&self, metrics: &EngagementMetrics) -> u64 {
        match self {
            EngagementMetric::Likes => metrics.likes,
            EngagementMetric::Impressions => metrics.impressions,
            EngagementMetric::Retweets => metrics.retweets,
            EngagementMetric::Replies => metrics.replies,
        }
    }
}

impl FromStr for EngagementMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "likes" => Ok(EngagementMetric::Likes),
            "impressions" => Ok(EngagementMetric::Impressions),
            "retweets" => Ok(EngagementMetric::Retweets),
            "replies" => Ok(EngagementMetric::Replies),
            _ => Err(s.to_string()),
        }
    }
}

/// Sort descending by the metric. Ties keep their order.
pub fn sort_by_engagement(records: &mut [TweetRecord], metric: EngagementMetric) {
    records.sort_by(|a, b| metric.value(&b.metrics).cmp(&metric.value(&a.metrics)));
}
