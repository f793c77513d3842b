use pulse_research::Engine;

use crate::background_job::*;

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Engine,

    /// Sentiment refresh job state
    pub sentiment_job_state: SentimentJobStateReceiver,
}
