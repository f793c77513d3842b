pub mod adapter;
pub mod cache;
mod engine;
pub mod format;
mod handler;
pub mod intent;
pub mod pacing;
pub mod pool;
pub mod sentiment;
#[cfg(test)]
mod test;
mod util;

pub use adapter::{normalize_query, ListOptions, ProfileOptions, ProfileResult, SearchOptions, ThreadOptions, XResearch};
pub use engine::Engine;
pub use handler::{prioritize_curated, Reply, ResearchHandler};
pub use sentiment::{asset_query, SentimentService, SentimentStatus, TickOutcome};
pub use util::retry_transport;
