use lazy_static::lazy_static;
use regex::Regex;

use x_client::EngagementMetric;

lazy_static! {
    static ref STATUS_URL: Regex = Regex::new(r"(?i)(?:x|twitter)\.com/(\w{1,15})/status/(\d{5,25})").unwrap();
    static ref THREAD: Regex = Regex::new(r"(?i)\b(?:thread|conversation)\b\D{0,20}?(\d{5,25})").unwrap();
    static ref ITEM: Regex = Regex::new(r"(?i)\b(?:post|tweet)\s+#?(\d{5,25})\b").unwrap();
    static ref LIST_SENTIMENT: Regex = Regex::new(r"(?i)\b(?:list|curated)\s+(?:sentiment|vibes?|mood)\b").unwrap();
    static ref SENTIMENT: Regex = Regex::new(r"(?i)\b(?:sentiment|vibes?|mood)\b").unwrap();
    static ref CASHTAG: Regex = Regex::new(r"\$([A-Za-z]{2,10})\b").unwrap();
    static ref PROFILE: Regex =
        Regex::new(r"(?i)@(\w{1,15})\s+(?:recent|latest|timeline|posts|tweets)\b|\bprofile\s+(?:of\s+|for\s+)?@?(\w{1,15})\b").unwrap();
    static ref SEARCH: Regex = Regex::new(
        r"(?i)(?:search\s+x\s+for|what\s+are\s+people\s+saying\s+about|x\s+research(?:\s+on)?|check\s+x\s+for|x\s+search(?:\s+for)?)\s*:?\s*(.+)$"
    )
    .unwrap();
    static ref AUTHOR_FILTER: Regex = Regex::new(r"(?i)\bfrom:\w{1,15}").unwrap();
    static ref DEEP: Regex = Regex::new(r"(?i)\s*\b(?:deep|more\s+results|all\s+pages)\b").unwrap();
    static ref METRIC: Regex = Regex::new(r"(?i)\s*\b(?:sorted\s+)?by\s+(likes|impressions|retweets|replies)\b").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Search {
        query: String,
        deep: bool,
        metric: EngagementMetric,
    },
    Profile {
        handle: String,
    },
    Thread {
        id: String,
    },
    Item {
        id: String,
    },
    Sentiment {
        asset: String,
    },
    ListSentiment,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Search { .. } => "search",
            Intent::Profile { .. } => "profile",
            Intent::Thread { .. } => "thread",
            Intent::Item { .. } => "item",
            Intent::Sentiment { .. } => "sentiment",
            Intent::ListSentiment => "list_sentiment",
        }
    }
}

/// Work out what a free-text request asks for. `None` when nothing matches.
pub fn parse_intent(text: &str, tracked_assets: &[String]) -> Option<Intent> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = STATUS_URL.captures(text) {
        let id = caps[2].to_string();
        return Some(if text.to_lowercase().contains("thread") {
            Intent::Thread { id }
        } else {
            Intent::Item { id }
        });
    }
    if let Some(caps) = THREAD.captures(text) {
        return Some(Intent::Thread { id: caps[1].to_string() });
    }
    if let Some(caps) = ITEM.captures(text) {
        return Some(Intent::Item { id: caps[1].to_string() });
    }

    if LIST_SENTIMENT.is_match(text) {
        return Some(Intent::ListSentiment);
    }
    if SENTIMENT.is_match(text) {
        if let Some(asset) = find_asset(text, tracked_assets) {
            return Some(Intent::Sentiment { asset });
        }
    }

    if let Some(caps) = PROFILE.captures(text) {
        if let Some(handle) = caps.get(1).or_else(|| caps.get(2)) {
            return Some(Intent::Profile {
                handle: handle.as_str().to_string(),
            });
        }
    }

    let query = match SEARCH.captures(text) {
        Some(caps) => caps[1].to_string(),
        None if AUTHOR_FILTER.is_match(text) => text.to_string(),
        None => return None,
    };
    let metric = METRIC
        .captures(&query)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or_default();
    let deep = DEEP.is_match(&query);
    let query = DEEP.replace_all(&METRIC.replace_all(&query, ""), "").to_string();
    let query = query.trim().trim_end_matches(['?', '.', '!']).trim().to_string();
    if query.is_empty() {
        return None;
    }
    Some(Intent::Search { query, deep, metric })
}

fn find_asset(text: &str, tracked_assets: &[String]) -> Option<String> {
    if let Some(caps) = CASHTAG.captures(text) {
        return Some(caps[1].to_uppercase());
    }
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .find_map(|word| {
            tracked_assets
                .iter()
                .find(|asset| asset.eq_ignore_ascii_case(word))
                .cloned()
        })
}
