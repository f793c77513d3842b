use std::collections::HashSet;

use itertools::Itertools;

use pulse_core::{SentimentEntry, SentimentLabel, Settings};

use crate::lexicon::Lexicon;

/// Signed keyword hits are divided by this before clamping to [-1, 1].
pub const SCORE_DIVISOR: f64 = 5.0;
/// How many tokens before a keyword are searched for a negation cue.
pub const NEGATION_WINDOW: usize = 3;
pub const CONFIDENCE_SCALE: f64 = 70.0;
pub const MAX_CONFIDENCE: f64 = 100.0;
pub const SCORE_STRENGTH_FACTOR: f64 = 2.0;
pub const SAMPLE_SIZE_DIVISOR: f64 = 25.0;
pub const SAMPLE_SIZE_CAP: f64 = 0.5;
pub const STRONG_SIGNAL_BAR: f64 = 0.2;
pub const STRONG_SIGNAL_BONUS: f64 = 0.08;
pub const CONTRARIAN_THRESHOLD: f64 = 0.65;

pub const CONTRARIAN_BULLISH_NOTE: &str =
    "Extreme bullish sentiment. Contrarian warning: extreme greed has often preceded pullbacks.";
pub const CONTRARIAN_BEARISH_NOTE: &str =
    "Extreme bearish sentiment. Contrarian note: extreme fear can mark local bottoms.";

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreConfig {
    pub min_sample: usize,
    pub bull_bear_threshold: f64,
    pub engagement_cap: f64,
    pub risk_min_count: usize,
    pub negation_window: usize,
    pub score_divisor: f64,
    pub contrarian_threshold: f64,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            min_sample: 3,
            bull_bear_threshold: 0.15,
            engagement_cap: 3.0,
            risk_min_count: 2,
            negation_window: NEGATION_WINDOW,
            score_divisor: SCORE_DIVISOR,
            contrarian_threshold: CONTRARIAN_THRESHOLD,
        }
    }
}

impl ScoreConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            min_sample: settings.min_tweets,
            bull_bear_threshold: settings.bull_bear_threshold,
            engagement_cap: settings.engagement_cap,
            risk_min_count: settings.risk_min_tweets,
            ..Default::default()
        }
    }
}

/// One record to score: its text and like count.
#[derive(Debug, Clone, Copy)]
pub struct ScoreItem<'a> {
    pub text: &'a str,
    pub likes: u64,
}

impl<'a> ScoreItem<'a> {
    pub fn new(text: &'a str, likes: u64) -> Self {
        Self { text, likes }
    }
}

/// Aggregate result, with the intermediate values that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    pub confidence: u8,
    pub risk_flag: bool,
    /// The aggregate the label was derived from.
    pub score: f64,
    pub weighted_mean: f64,
    pub unweighted_mean: f64,
    pub sample_size: usize,
    pub risk_count: usize,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub contrarian_note: Option<&'static str>,
}

impl SentimentScore {
    fn neutral(sample_size: usize) -> Self {
        Self {
            label: SentimentLabel::Neutral,
            confidence: 0,
            risk_flag: false,
            score: 0.0,
            weighted_mean: 0.0,
            unweighted_mean: 0.0,
            sample_size,
            risk_count: 0,
            bullish_count: 0,
            bearish_count: 0,
            contrarian_note: None,
        }
    }

    pub fn to_entry(&self, updated_at_ms: i64) -> SentimentEntry {
        SentimentEntry {
            sentiment: self.label,
            confidence: self.confidence,
            risk_flag: self.risk_flag,
            updated_at: updated_at_ms,
            contrarian: self.contrarian_note.is_some(),
            contrarian_note: self.contrarian_note.map(|n| n.to_string()),
            sample_size: Some(self.sample_size),
        }
    }
}

/// Score a batch of records. Pure: no I/O, same input gives the same output.
pub fn score_items(items: &[ScoreItem], lexicon: &Lexicon, config: &ScoreConfig) -> SentimentScore {
    let n = items.len();
    if n == 0 || n < config.min_sample {
        return SentimentScore::neutral(n);
    }

    let negation: HashSet<&str> = lexicon.negation.iter().map(|w| w.as_str()).collect();

    let mut sum = 0.0;
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut risk_count = 0;
    let mut bullish_count = 0;
    let mut bearish_count = 0;

    for item in items {
        let lower = normalize(item.text);
        let tokens = tokenize(&lower);
        let s = score_tokens(&lower, &tokens, lexicon, &negation, config);
        if s > 0.0 {
            bullish_count += 1;
        } else if s < 0.0 {
            bearish_count += 1;
        }
        if contains_any(&tokens, &lexicon.risk) {
            risk_count += 1;
        }
        let weight = engagement_weight(item.likes, config.engagement_cap);
        sum += s;
        weighted_sum += s * weight;
        total_weight += weight;
    }

    let unweighted_mean = sum / n as f64;
    let weighted_mean = if total_weight > 0.0 {
        weighted_sum / total_weight
    } else {
        0.0
    };
    // The weighted mean wins unless it is exactly zero
    let score = if weighted_mean != 0.0 {
        weighted_mean
    } else {
        unweighted_mean
    };

    let label = if score > config.bull_bear_threshold {
        SentimentLabel::Bullish
    } else if score < -config.bull_bear_threshold {
        SentimentLabel::Bearish
    } else {
        SentimentLabel::Neutral
    };

    let contrarian_note = if score >= config.contrarian_threshold {
        Some(CONTRARIAN_BULLISH_NOTE)
    } else if score <= -config.contrarian_threshold {
        Some(CONTRARIAN_BEARISH_NOTE)
    } else {
        None
    };

    SentimentScore {
        label,
        confidence: confidence(score, n),
        risk_flag: risk_count >= config.risk_min_count,
        score,
        weighted_mean,
        unweighted_mean,
        sample_size: n,
        risk_count,
        bullish_count,
        bearish_count,
        contrarian_note,
    }
}

/// Per-record sentiment in [-1, 1].
pub fn score_text(text: &str, lexicon: &Lexicon, config: &ScoreConfig) -> f64 {
    let negation: HashSet<&str> = lexicon.negation.iter().map(|w| w.as_str()).collect();
    let lower = normalize(text);
    score_tokens(&lower, &tokenize(&lower), lexicon, &negation, config)
}

pub fn has_risk_keyword(text: &str, lexicon: &Lexicon) -> bool {
    contains_any(&tokenize(text), &lexicon.risk)
}

/// `1 + log10(1 + likes)`, capped so one viral record cannot dominate.
pub fn engagement_weight(likes: u64, cap: f64) -> f64 {
    (1.0 + (1.0 + likes as f64).log10()).min(cap)
}

fn confidence(score: f64, sample_size: usize) -> u8 {
    let magnitude = score.abs();
    let sample_term = (sample_size as f64 / SAMPLE_SIZE_DIVISOR).min(SAMPLE_SIZE_CAP);
    let bonus = if magnitude > STRONG_SIGNAL_BAR {
        STRONG_SIGNAL_BONUS
    } else {
        0.0
    };
    let strength = (magnitude * SCORE_STRENGTH_FACTOR + sample_term + bonus).min(1.0);
    (strength * CONFIDENCE_SCALE).round().min(MAX_CONFIDENCE) as u8
}

// MARK: Helpers

fn score_tokens(
    lower: &str,
    tokens: &[String],
    lexicon: &Lexicon,
    negation: &HashSet<&str>,
    config: &ScoreConfig,
) -> f64 {
    if let Some(label) = phrase_override(lower, lexicon) {
        return label.signum();
    }

    let mut hits = 0i32;
    for (words, sign) in [(&lexicon.bullish, 1), (&lexicon.bearish, -1)] {
        for word in words.iter() {
            let Some(pos) = find_phrase(tokens, word) else {
                continue;
            };
            if is_negated(tokens, pos, negation, config.negation_window) {
                hits -= sign;
            } else {
                hits += sign;
            }
        }
    }
    if hits == 0 {
        return 0.0;
    }
    (hits as f64 / config.score_divisor).clamp(-1.0, 1.0)
}

/// Overrides match as plain substrings of the lowercased text, so `bull traps` still hits `bull trap`.
fn phrase_override(lower: &str, lexicon: &Lexicon) -> Option<SentimentLabel> {
    lexicon
        .phrase_overrides
        .iter()
        .find(|o| !o.phrase.is_empty() && lower.contains(o.phrase.to_lowercase().as_str()))
        .map(|o| o.label)
}

fn is_negated(tokens: &[String], pos: usize, negation: &HashSet<&str>, window: usize) -> bool {
    tokens[pos.saturating_sub(window)..pos]
        .iter()
        .any(|t| negation.contains(t.as_str()) || t.ends_with("n't"))
}

fn contains_any(tokens: &[String], words: &[String]) -> bool {
    words.iter().any(|w| find_phrase(tokens, w).is_some())
}

/// Position of the first token sequence matching `phrase`, compared on token boundaries.
fn find_phrase(tokens: &[String], phrase: &str) -> Option<usize> {
    let needle = tokenize(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return None;
    }
    tokens.windows(needle.len()).position(|w| w == needle.as_slice())
}

fn normalize(text: &str) -> String {
    text.to_lowercase().replace('\u{2019}', "'")
}

/// Lowercase word tokens. Apostrophes stay inside words so contractions like `don't` survive.
fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect_vec()
}
