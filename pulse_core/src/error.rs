use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("X API rate limited. Resets in {wait_seconds}s")]
    RateLimited { wait_seconds: u64 },
    #[error("Not configured: {0}")]
    NotConfigured(String),
    #[error("{0}")]
    Transport(String),
    #[error("Cannot parse response: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] diesel::ConnectionError),
    #[error("Database pool error: {0}")]
    PoolError(#[from] diesel::r2d2::PoolError),
    #[error("Cannot encode/decode JSON: {0}")]
    JSONError(#[from] serde_json::Error),
    #[error("Parsing error: {0}")]
    ParsingError(#[from] pulse_util::ParsingError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    pub fn wait_seconds(&self) -> Option<u64> {
        match self {
            Error::RateLimited { wait_seconds } => Some(*wait_seconds),
            _ => None,
        }
    }
}
