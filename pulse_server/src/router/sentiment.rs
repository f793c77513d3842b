use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;

use pulse_core::{Error as PulseError, SentimentReading};
use pulse_research::SentimentStatus;

use crate::{background_job::SentimentJobStateResponse, error::Result, state::AppState};

pub fn sentiment_router() -> Router<AppState> {
    Router::new()
        .route("/sentiment", get(get_all_sentiment))
        .route("/sentiment/list", get(get_list_sentiment))
        .route("/sentiment/:asset", get(get_sentiment))
}

#[derive(Debug, Clone, Serialize)]
struct AssetSentimentResponse {
    asset: String,
    #[serde(flatten)]
    reading: SentimentReading,
}

#[derive(Debug, Clone, Serialize)]
struct SentimentOverviewResponse {
    #[serde(flatten)]
    status: SentimentStatus,
    job: SentimentJobStateResponse,
}

async fn get_sentiment(State(app_state): State<AppState>, Path(asset): Path<String>) -> Json<AssetSentimentResponse> {
    let asset = asset.trim().to_uppercase();
    let reading = app_state.engine.sentiment.get_sentiment(&asset);
    Json(AssetSentimentResponse { asset, reading })
}

async fn get_all_sentiment(State(app_state): State<AppState>) -> Json<SentimentOverviewResponse> {
    let job = SentimentJobStateResponse::from(&*app_state.sentiment_job_state.borrow());
    Json(SentimentOverviewResponse {
        status: app_state.engine.sentiment.status(),
        job,
    })
}

async fn get_list_sentiment(State(app_state): State<AppState>) -> Result<Json<SentimentReading>> {
    let engine = &app_state.engine;
    if engine.settings.list_id.is_none() {
        return Err(PulseError::NotConfigured("X_LIST_ID is not set".to_string()))?;
    }
    if !engine.sentiment.is_configured() {
        return Err(PulseError::NotConfigured("X_BEARER_TOKEN is not set".to_string()))?;
    }
    Ok(Json(engine.sentiment.list_sentiment().await))
}
