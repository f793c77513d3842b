use std::future::Future;

use pulse_core::Error;

pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_COUNT: usize = 2;

/// Map a client error into the subsystem taxonomy. Rate limits are handled by the pool before this.
pub(crate) fn map_client_error(err: x_client::Error) -> Error {
    match err {
        x_client::Error::RateLimited { wait_seconds, .. } => Error::RateLimited { wait_seconds },
        x_client::Error::JSONError(e) => Error::Parse(e.to_string()),
        other => Error::Transport(other.to_string()),
    }
}

/// Retry transport failures a few times. Rate limits and configuration errors are returned at once.
pub fn retry_transport<R, T, F>(f: F) -> impl Future<Output = Result<R, Error>>
where
    T: Future<Output = Result<R, Error>>,
    F: FnMut() -> T,
{
    use tokio_retry::{strategy::FixedInterval, RetryIf};
    let strategy = FixedInterval::from_millis(DEFAULT_RETRY_DELAY_MS).take(DEFAULT_RETRY_COUNT);
    RetryIf::spawn(strategy, f, |e: &Error| matches!(e, Error::Transport(_)))
}
