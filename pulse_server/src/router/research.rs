use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use pulse_research::Reply;

use crate::state::AppState;

pub fn research_router() -> Router<AppState> {
    Router::new().route("/research", get(handle_research))
}

#[derive(Debug, Clone, Deserialize)]
struct ResearchQuery {
    #[serde(default)]
    q: String,
}

/// Always 200; the reply says whether the request succeeded.
async fn handle_research(State(app_state): State<AppState>, Query(query): Query<ResearchQuery>) -> Json<Reply> {
    Json(app_state.engine.handler.handle(&query.q).await)
}
