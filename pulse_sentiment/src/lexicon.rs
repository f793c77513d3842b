use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pulse_core::SentimentLabel;

pub const BULLISH_WORDS: &[&str] = &[
    "bullish", "moon", "pump", "buy", "long", "great", "love", "bull", "growth", "profit", "accumulate", "bottom",
    "rally", "surge", "breakout", "undervalued", "upgrade",
];

pub const BEARISH_WORDS: &[&str] = &[
    "bearish", "dump", "sell", "short", "bad", "hate", "bear", "crash", "fud", "top", "overvalued", "downgrade",
    "plunge", "capitulation",
];

pub const RISK_WORDS: &[&str] = &["rug", "scam", "exploit", "hack", "hacked", "drain", "drained", "stolen", "depeg"];

pub const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "neither", "nor", "hardly", "without", "isn't", "wasn't", "aren't", "won't", "don't",
    "doesn't", "didn't", "can't", "cannot",
];

pub const PHRASE_OVERRIDES: &[(&str, SentimentLabel)] = &[
    ("bull trap", SentimentLabel::Neutral),
    ("bear trap", SentimentLabel::Neutral),
    ("buy the dip", SentimentLabel::Bullish),
    ("buying the dip", SentimentLabel::Bullish),
    ("short squeeze", SentimentLabel::Bullish),
    ("bottom is in", SentimentLabel::Bullish),
    ("dead cat bounce", SentimentLabel::Bearish),
    ("exit liquidity", SentimentLabel::Bearish),
    ("top is in", SentimentLabel::Bearish),
];

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("Cannot read lexicon file: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid lexicon file: {0}")]
    JSONError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseOverride {
    pub phrase: String,
    pub label: SentimentLabel,
}

/// Word lists used by the scoring function.
///
/// An override file is a JSON object with any of `bullish`, `bearish`, `risk`, `negation`, `phraseOverrides`.
/// Lists present in the file replace the built-in ones; absent lists keep the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Lexicon {
    pub bullish: Vec<String>,
    pub bearish: Vec<String>,
    pub risk: Vec<String>,
    pub negation: Vec<String>,
    pub phrase_overrides: Vec<PhraseOverride>,
}

impl Default for Lexicon {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            bullish: owned(BULLISH_WORDS),
            bearish: owned(BEARISH_WORDS),
            risk: owned(RISK_WORDS),
            negation: owned(NEGATION_WORDS),
            phrase_overrides: PHRASE_OVERRIDES
                .iter()
                .map(|(phrase, label)| PhraseOverride {
                    phrase: phrase.to_string(),
                    label: *label,
                })
                .collect(),
        }
    }
}

impl Lexicon {
    pub fn from_json(content: &str) -> Result<Lexicon, LexiconError> {
        let lexicon: Lexicon = serde_json::from_str(content)?;
        Ok(lexicon.normalized())
    }

    pub fn from_file(path: &Path) -> Result<Lexicon, LexiconError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load the override file if one is given, falling back to the defaults when it is unreadable.
    pub fn load_or_default(path: Option<&Path>) -> Lexicon {
        let Some(path) = path else {
            return Lexicon::default();
        };
        match Lexicon::from_file(path) {
            Ok(lexicon) => {
                tracing::info!("Loaded sentiment lexicon from {}", path.display());
                lexicon
            }
            Err(e) => {
                tracing::warn!("Cannot load sentiment lexicon {}: {}. Using defaults", path.display(), e);
                Lexicon::default()
            }
        }
    }

    /// Lowercase every entry and drop duplicates, keeping first occurrence order.
    fn normalized(self) -> Lexicon {
        fn clean(words: Vec<String>) -> Vec<String> {
            let mut seen = HashSet::new();
            words
                .into_iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty() && seen.insert(w.clone()))
                .collect()
        }
        Lexicon {
            bullish: clean(self.bullish),
            bearish: clean(self.bearish),
            risk: clean(self.risk),
            negation: clean(self.negation),
            phrase_overrides: self
                .phrase_overrides
                .into_iter()
                .map(|o| PhraseOverride {
                    phrase: o.phrase.trim().to_lowercase(),
                    label: o.label,
                })
                .filter(|o| !o.phrase.is_empty())
                .collect(),
        }
    }
}
