use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    /// 429. `wait_seconds` is 0 when the response carried no usable hint.
    #[error("X API rate limited. Resets in {wait_seconds}s")]
    RateLimited {
        wait_seconds: u64,
        reset_epoch: Option<i64>,
        message: String,
    },
    #[error("X API {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Cannot encode/decode JSON: {0}")]
    JSONError(#[from] serde_json::Error),
    #[error("Network Error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Cannot parse URL: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Status { status: 404, .. })
    }

    /// The credential's tier cannot use this endpoint.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Status { status: 401 | 403, .. })
    }
}
