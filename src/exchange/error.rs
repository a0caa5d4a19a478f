use std::time::Duration;

use thiserror::Error;

/// Failure of one private API call.
///
/// Transport, rate-limit and HTTP errors mean the request may not have been
/// processed; `Api` means the exchange understood and refused it.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Connection, DNS or body read failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// HTTP 429 on the first attempt and on its single retry.
    #[error("rate limited after retry: {body}")]
    RateLimited { body: String },

    /// Any other non-2xx status.
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body does not match the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Well-formed envelope with `success` = 0.
    #[error("api error: {message}")]
    Api {
        message: String,
        code: Option<String>,
    },

    /// The per-call deadline elapsed, including any retry wait.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ExchangeError {
    /// Server-supplied message for business errors.
    pub fn api_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}
