use phf::phf_map;

pub const API_BASE: &str = "https://api.x.com/2";
pub const USER_AGENT: &str = concat!("pulse-x-research/", env!("CARGO_PKG_VERSION"));

pub const SEARCH_MIN_RESULTS: u32 = 10;
pub const SEARCH_MAX_RESULTS: u32 = 100;
pub const TIMELINE_MIN_RESULTS: u32 = 5;
pub const TIMELINE_MAX_RESULTS: u32 = 100;
pub const LIST_MAX_RESULTS: u32 = 100;

pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";
pub const ERROR_BODY_MAX_CHARS: usize = 200;

pub const TWEET_FIELDS: &[&str] = &["created_at", "public_metrics", "author_id", "conversation_id", "entities"];
pub const EXPANSIONS: &[&str] = &["author_id"];
pub const USER_FIELDS: &[&str] = &["username", "name", "public_metrics", "description", "created_at"];

/// Endpoint name -> path template. `{}` is replaced with the path argument.
pub static ENDPOINTS: phf::Map<&'static str, &'static str> = phf_map! {
    "SearchRecent" => "/tweets/search/recent",
    "TweetById" => "/tweets/{}",
    "UserByUsername" => "/users/by/username/{}",
    "UserTweets" => "/users/{}/tweets",
    "ListTweets" => "/lists/{}/tweets",
};
