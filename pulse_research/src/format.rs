use itertools::Itertools;

use pulse_core::SentimentReading;
use pulse_util::truncate_chars;
use x_client::TweetRecord;

use crate::adapter::ProfileResult;

pub const BRIEFING_MAX_LINES: usize = 12;
pub const SNIPPET_MAX_CHARS: usize = 120;
pub const SOURCE_FOOTER: &str = "_Source: X API (read-only, last 7 days)._";

/// Whitespace collapsed, cut at [`SNIPPET_MAX_CHARS`] with an ellipsis.
pub fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().join(" ");
    let cut = truncate_chars(&collapsed, SNIPPET_MAX_CHARS);
    if cut.len() < collapsed.len() {
        format!("{}…", cut.trim_end())
    } else {
        collapsed
    }
}

pub fn format_record_line(record: &TweetRecord) -> String {
    let author = record.author_handle.as_deref().unwrap_or("unknown");
    format!(
        "- **@{}**: \"{}\" (L{} R{}) [Tweet]({})",
        author,
        snippet(&record.text),
        record.metrics.likes,
        record.metrics.retweets,
        record.permalink
    )
}

fn record_lines(records: &[TweetRecord]) -> String {
    records
        .iter()
        .take(BRIEFING_MAX_LINES)
        .map(format_record_line)
        .join("\n")
}

pub fn format_briefing(query: &str, records: &[TweetRecord]) -> String {
    if records.is_empty() {
        return format!("**X research: {}**\n\nNo recent posts found.\n\n{}", query, SOURCE_FOOTER);
    }
    format!(
        "**X research: {}**\n\n{}\n\n{}",
        query,
        record_lines(records),
        SOURCE_FOOTER
    )
}

pub fn format_profile(result: &ProfileResult) -> String {
    let user = &result.user;
    let mut text = format!(
        "**@{}** ({}) · {} followers · {} posts",
        user.handle, user.name, user.followers, user.tweet_count
    );
    if let Some(description) = user.description.as_deref().filter(|d| !d.trim().is_empty()) {
        text.push_str(&format!("\n_{}_", snippet(description)));
    }
    if result.records.is_empty() {
        text.push_str("\n\nNo recent posts.");
    } else {
        text.push_str("\n\n");
        text.push_str(&record_lines(&result.records));
    }
    text.push_str("\n\n");
    text.push_str(SOURCE_FOOTER);
    text
}

pub fn format_thread(id: &str, records: &[TweetRecord]) -> String {
    if records.is_empty() {
        return format!("**Thread {}**\n\nNothing found for this conversation.\n\n{}", id, SOURCE_FOOTER);
    }
    format!("**Thread {}**\n\n{}\n\n{}", id, record_lines(records), SOURCE_FOOTER)
}

pub fn format_item(record: &TweetRecord) -> String {
    let author = record.author_handle.as_deref().unwrap_or("unknown");
    let posted = record
        .created_at
        .map(|date| format!(" · {}", date.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default();
    format!(
        "**@{}**{}\n\n{}\n\nL{} R{} Replies {} Views {} · [Tweet]({})",
        author,
        posted,
        record.text.trim(),
        record.metrics.likes,
        record.metrics.retweets,
        record.metrics.replies,
        record.metrics.impressions,
        record.permalink
    )
}

fn reading_summary(reading: &SentimentReading) -> String {
    let mut text = format!("{} ({}% confidence)", reading.sentiment, reading.confidence);
    if reading.risk_flag {
        text.push_str(" · ⚠ risk keywords trending");
    }
    if reading.contrarian {
        text.push_str(" · crowded, watch for a contrarian move");
    }
    text
}

pub fn format_sentiment(asset: &str, reading: &SentimentReading) -> String {
    match reading.updated_at {
        Some(_) => format!("**X sentiment for {}**: {}", asset, reading_summary(reading)),
        None => format!("**X sentiment for {}**: no fresh reading yet (neutral).", asset),
    }
}

pub fn format_list_sentiment(reading: &SentimentReading) -> String {
    match reading.updated_at {
        Some(_) => format!("**Curated list sentiment**: {}", reading_summary(reading)),
        None => "**Curated list sentiment**: no reading available (neutral).".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x_client::EngagementMetrics;

    fn record(id: &str, text: &str, likes: u64) -> TweetRecord {
        TweetRecord {
            id: id.to_string(),
            text: text.to_string(),
            author_id: Some("1".to_string()),
            author_handle: Some("alice".to_string()),
            author_name: Some("Alice".to_string()),
            author_followers: 10,
            created_at: None,
            conversation_id: None,
            metrics: EngagementMetrics {
                likes,
                retweets: 2,
                ..Default::default()
            },
            entities: Default::default(),
            permalink: format!("https://x.com/alice/status/{}", id),
        }
    }

    #[test]
    fn test_snippet() {
        assert_eq!(snippet("  gm \n\n frens "), "gm frens");
        let long = "a".repeat(200);
        let cut = snippet(&long);
        assert_eq!(cut.chars().count(), SNIPPET_MAX_CHARS + 1);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_briefing() {
        let records = (0..20).map(|i| record(&i.to_string(), "btc looks strong", i)).collect_vec();
        let text = format_briefing("btc", &records);
        assert!(text.starts_with("**X research: btc**\n\n"));
        assert!(text.ends_with(SOURCE_FOOTER));
        assert_eq!(text.lines().filter(|l| l.starts_with("- **@")).count(), BRIEFING_MAX_LINES);
        assert!(text.contains("- **@alice**: \"btc looks strong\" (L0 R2) [Tweet](https://x.com/alice/status/0)"));
    }

    #[test]
    fn test_empty_briefing() {
        let text = format_briefing("nothing", &[]);
        assert!(text.contains("No recent posts found."));
    }

    #[test]
    fn test_sentiment_text() {
        let reading = SentimentReading {
            sentiment: pulse_core::SentimentLabel::Bullish,
            confidence: 72,
            risk_flag: true,
            updated_at: Some(1),
            contrarian: false,
        };
        assert_eq!(
            format_sentiment("BTC", &reading),
            "**X sentiment for BTC**: bullish (72% confidence) · ⚠ risk keywords trending"
        );
        assert!(format_sentiment("ETH", &SentimentReading::neutral()).contains("no fresh reading"));
    }
}
