pub mod config;
pub mod error;
pub mod model;
pub mod persist;
pub mod schema;
pub mod store;

pub use config::Settings;
pub use error::*;
pub use model::*;
