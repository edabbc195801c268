use std::time::Duration;

/// Failure surface of a single provider call.
///
/// The gateway treats every variant as "continue with the next attempt"; the
/// distinction matters for health reporting and retry decisions upstream.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network level failure: unreachable, DNS, connection reset.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The endpoint rejected our credentials.
    #[error("authentication rejected: {0}")]
    Auth(String),
    /// The endpoint responded, but not with usable JSON output.
    #[error("generation failed: {message}")]
    Generation { message: String, rate_limited: bool },
    /// The caller-supplied deadline elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            rate_limited: true,
        }
    }

    /// Map an HTTP status to the matching error kind.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Auth(format!("{status}: {body}")),
            429 => Self::rate_limited(format!("{status}: {body}")),
            _ => Self::generation(format!("{status}: {body}")),
        }
    }

    /// Timeouts fold into connection semantics for retry decisions.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if err.is_connect() || err.is_request() {
            Self::Connection(err.to_string())
        } else {
            Self::generation(err.to_string())
        }
    }
}
