mod background_job;
mod error;
mod router;
mod state;

use axum::Router;
use dotenvy::dotenv;
use tower_http::trace::TraceLayer;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use std::sync::Arc;

use pulse_core::{store::SqliteRateLimitStore, Settings};
use pulse_research::Engine;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();

    // 1. Initialize logger
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()
        .unwrap()
        .add_directive("hyper::proto=info".parse().unwrap())
        .add_directive("hyper::client=info".parse().unwrap())
        .add_directive("reqwest=info".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    // 2. Load configuration
    let settings = Settings::from_env().expect("invalid X research configuration");
    if !settings.is_configured() {
        tracing::warn!("X_BEARER_TOKEN is not set. Sentiment reads stay neutral and research is disabled");
    }

    // 3. Open the shared rate-limit store
    let store = SqliteRateLimitStore::open(&settings.database_url).expect("cannot open rate-limit store");

    // 4. Build research engine
    let address = settings.server_address.clone();
    let refresh_interval = settings.refresh_interval;
    let engine = Engine::build(settings, Arc::new(store)).expect("cannot build X research engine");

    // 5. Initialize background jobs
    let sentiment_job_state = background_job::listen_sentiment_refresh(engine.sentiment.clone(), refresh_interval);

    // 6. Setup state and router
    let sentiment = engine.sentiment.clone();
    let app_state = AppState {
        engine,
        sentiment_job_state,
    };

    let app = Router::new()
        .merge(router::sentiment::sentiment_router())
        .merge(router::research::research_router())
        .layer(TraceLayer::new_for_http().on_request(()))
        .with_state(app_state);

    // 7. Start server
    tracing::info!("Server starting at {}", address);
    axum::Server::bind(&address.parse().expect("SERVER_ADDRESS must be a socket address"))
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // 8. Flush sentiment to disk
    if let Err(e) = sentiment.persist().await {
        tracing::warn!("Cannot persist X sentiment on shutdown: {}", e);
    }
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
