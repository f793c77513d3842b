use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use pulse_core::Error as PulseError;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug)]
pub struct ServerError(anyhow::Error);

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }
        let retry_after = self.pulse_error().and_then(PulseError::wait_seconds);
        let mut response = (status, self.to_string()).into_response();
        if let Some(wait_seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(wait_seconds));
        }
        response
    }
}

impl ServerError {
    fn pulse_error(&self) -> Option<&PulseError> {
        self.0.chain().find_map(|cause| cause.downcast_ref::<PulseError>())
    }

    fn status_code(&self) -> StatusCode {
        match self.pulse_error() {
            Some(err) => match err {
                PulseError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                PulseError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                PulseError::Transport(_) => StatusCode::BAD_GATEWAY,
                PulseError::Parse(_) => StatusCode::BAD_GATEWAY,
                PulseError::ParsingError(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
