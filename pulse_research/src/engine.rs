use std::sync::Arc;

use pulse_core::store::RateLimitStore;
use pulse_core::{Error, Result, Settings};
use x_client::{ReqwestTransport, Transport, XClient};

use crate::adapter::XResearch;
use crate::cache::ResponseCache;
use crate::handler::ResearchHandler;
use crate::pacing::Pacer;
use crate::pool::CredentialPool;
use crate::sentiment::SentimentService;

/// Everything the research subsystem needs, wired once at startup.
///
/// Both adapters share the HTTP client, the pacer and the response caches. Their credential
/// pools differ: background work uses its own tokens when configured and otherwise borrows the
/// foreground credential, cooldowns included.
#[derive(Debug, Clone)]
pub struct Engine {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn RateLimitStore>,
    pub foreground: Option<Arc<XResearch>>,
    pub background: Option<Arc<XResearch>>,
    pub sentiment: Arc<SentimentService>,
    pub handler: Arc<ResearchHandler>,
}

impl Engine {
    pub fn build(settings: Settings, store: Arc<dyn RateLimitStore>) -> Result<Engine> {
        let transport = ReqwestTransport::new().map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self::build_with_transport(settings, store, Arc::new(transport)))
    }

    pub fn build_with_transport(
        settings: Settings,
        store: Arc<dyn RateLimitStore>,
        transport: Arc<dyn Transport>,
    ) -> Engine {
        let settings = Arc::new(settings);
        let (foreground_pool, background_pool) = CredentialPool::from_settings(&settings, store.clone());

        let client = XClient::new(transport);
        let pacer = Arc::new(Pacer::new(settings.min_call_interval));
        let search_cache = Arc::new(ResponseCache::new());
        let profile_cache = Arc::new(ResponseCache::new());
        let adapter = |pool: Arc<CredentialPool>| {
            (!pool.is_empty()).then(|| {
                Arc::new(XResearch::new(
                    client.clone(),
                    pool,
                    pacer.clone(),
                    search_cache.clone(),
                    profile_cache.clone(),
                ))
            })
        };
        let foreground = adapter(foreground_pool);
        let background = adapter(background_pool);

        if foreground.is_none() {
            tracing::warn!("X_BEARER_TOKEN is not set, X research is disabled");
        } else if !settings.has_background_pool() {
            tracing::info!("No background X credentials, sentiment refresh shares the foreground token");
        }

        let sentiment = Arc::new(SentimentService::new(settings.clone(), background.clone()));
        let handler = Arc::new(ResearchHandler::new(
            settings.clone(),
            foreground.clone(),
            sentiment.clone(),
        ));

        Engine {
            settings,
            store,
            foreground,
            background,
            sentiment,
            handler,
        }
    }
}
