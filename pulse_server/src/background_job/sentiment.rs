use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::watch,
    task,
    time::{self, Duration, MissedTickBehavior},
};

use pulse_core::SentimentLabel;
use pulse_research::{SentimentService, TickOutcome};

#[derive(Debug, Clone)]
pub enum SentimentJobState {
    Ready,
    Running,
    Success {
        asset: String,
        sentiment: SentimentLabel,
        confidence: u8,
        finished_at: DateTime<Utc>,
    },
    Skipped {
        asset: Option<String>,
        wait_seconds: u64,
        reason: String,
    },
    Failed {
        asset: String,
        error: String,
    },
}

impl From<TickOutcome> for SentimentJobState {
    fn from(outcome: TickOutcome) -> Self {
        match outcome {
            TickOutcome::Disabled => SentimentJobState::Skipped {
                asset: None,
                wait_seconds: 0,
                reason: "disabled".to_string(),
            },
            TickOutcome::NotConfigured => SentimentJobState::Skipped {
                asset: None,
                wait_seconds: 0,
                reason: "not configured".to_string(),
            },
            TickOutcome::Skipped { asset, wait_seconds } => SentimentJobState::Skipped {
                asset: Some(asset),
                wait_seconds,
                reason: "cooling down".to_string(),
            },
            TickOutcome::RateLimited { asset, wait_seconds } => SentimentJobState::Skipped {
                asset: Some(asset),
                wait_seconds,
                reason: "rate limited".to_string(),
            },
            TickOutcome::Refreshed { asset, entry } => SentimentJobState::Success {
                asset,
                sentiment: entry.sentiment,
                confidence: entry.confidence,
                finished_at: Utc::now(),
            },
            TickOutcome::Failed { asset, error } => SentimentJobState::Failed { asset, error },
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeneralJobState {
    #[default]
    Ready,
    Running,
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SentimentJobStateResponse {
    state: GeneralJobState,
    asset: Option<String>,
    wait_seconds: Option<u64>,
    reason: Option<String>,
    error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

impl From<&SentimentJobState> for SentimentJobStateResponse {
    fn from(state: &SentimentJobState) -> Self {
        match state {
            SentimentJobState::Ready => Default::default(),
            SentimentJobState::Running => Self {
                state: GeneralJobState::Running,
                ..Default::default()
            },
            SentimentJobState::Success {
                asset, finished_at, ..
            } => Self {
                state: GeneralJobState::Success,
                asset: Some(asset.clone()),
                finished_at: Some(*finished_at),
                ..Default::default()
            },
            SentimentJobState::Skipped {
                asset,
                wait_seconds,
                reason,
            } => Self {
                state: GeneralJobState::Skipped,
                asset: asset.clone(),
                wait_seconds: Some(*wait_seconds),
                reason: Some(reason.clone()),
                ..Default::default()
            },
            SentimentJobState::Failed { asset, error } => Self {
                state: GeneralJobState::Failed,
                asset: Some(asset.clone()),
                error: Some(error.clone()),
                ..Default::default()
            },
        }
    }
}

pub type SentimentJobStateSender = watch::Sender<SentimentJobState>;
pub type SentimentJobStateReceiver = watch::Receiver<SentimentJobState>;

/// Set up before server started. One asset per tick, the first tick right away.
pub fn listen_sentiment_refresh(sentiment: Arc<SentimentService>, interval: Duration) -> SentimentJobStateReceiver {
    let (state_sender, state_receiver) = watch::channel(SentimentJobState::Ready);

    task::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            state_sender.send_replace(SentimentJobState::Running);
            let state = SentimentJobState::from(sentiment.tick().await);
            tracing::debug!("Sentiment refresh tick: {:?}", state);
            if state_sender.send(state).is_err() {
                tracing::info!("Sentiment refresh job stopped");
                break;
            }
        }
    });

    state_receiver
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::SentimentEntry;

    #[test]
    fn test_outcome_to_state() {
        let state = SentimentJobState::from(TickOutcome::RateLimited {
            asset: "BTC".to_string(),
            wait_seconds: 30,
        });
        let response = SentimentJobStateResponse::from(&state);
        assert!(matches!(response.state, GeneralJobState::Skipped));
        assert_eq!(response.wait_seconds, Some(30));
        assert_eq!(response.reason.as_deref(), Some("rate limited"));

        let entry = SentimentEntry {
            sentiment: SentimentLabel::Bearish,
            confidence: 55,
            risk_flag: false,
            updated_at: 0,
            contrarian: false,
            contrarian_note: None,
            sample_size: Some(12),
        };
        let state = SentimentJobState::from(TickOutcome::Refreshed {
            asset: "ETH".to_string(),
            entry,
        });
        let response = SentimentJobStateResponse::from(&state);
        assert!(matches!(response.state, GeneralJobState::Success));
        assert_eq!(response.asset.as_deref(), Some("ETH"));
    }
}
