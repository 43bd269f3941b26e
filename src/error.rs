use std::{fmt, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};

pub type Result<T> = std::result::Result<T, Error>;

/// Why a request stopped before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => f.write_str("request cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

/// Errors surfaced by the metadata client.
///
/// The type is `Clone` because a single in-flight request can serve many
/// waiters, and every one of them receives the same outcome.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("invalid or unsupported Spotify URL: {0}")]
    InvalidReference(String),

    #[error("failed to get Spotify access token: {0}")]
    AuthFailure(String),

    #[error(
        "spotify rate limited host={host}{endpoint_part} wait={wait_secs}s until={until}{retry_part} backoff={backoff_secs}s",
        endpoint_part = .endpoint.as_deref().map(|e| format!(" endpoint={e}")).unwrap_or_default(),
        wait_secs = .wait.as_secs(),
        until = .cooldown_until.to_rfc3339_opts(SecondsFormat::Secs, true),
        retry_part = .retry_after.map(|r| format!(" retry-after={}s", r.as_secs())).unwrap_or_default(),
        backoff_secs = .backoff.as_secs(),
    )]
    RateLimited {
        host: String,
        endpoint: Option<String>,
        retry_after: Option<Duration>,
        wait: Duration,
        cooldown_until: DateTime<Utc>,
        backoff: Duration,
    },

    #[error("spotify API unauthorized (401) endpoint={endpoint}{}", body_suffix(.body))]
    Unauthorized { endpoint: String, body: String },

    #[error("spotify API returned status {status} for {endpoint}{}", body_suffix(.body))]
    Upstream {
        status: u16,
        endpoint: String,
        body: String,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Cancelled(CancelReason),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("totp generation failed: {0}")]
    Totp(String),

    #[error("spotify oauth: {0}")]
    OAuth(String),

    #[error("io error: {0}")]
    Io(String),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" body={body:?}")
    }
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Status code for errors that came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Unauthorized { .. } => Some(401),
            Error::RateLimited { .. } => Some(429),
            Error::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::Decode(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
