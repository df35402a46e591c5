//! Provider API errors and their one-time classification.

use reelforge_core::error::FailureKind;

/// Errors from the provider REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("provider error ({status}): {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// A 2xx response that is structurally unusable (missing media id,
    /// unparseable operations list).
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// Classify this error for rotation/fallback decisions.
    ///
    /// Decided here, once, from the status code with a body-phrase
    /// fallback for providers that tunnel errors through odd statuses.
    /// Downstream code branches on the returned [`FailureKind`] and
    /// never re-parses message text.
    pub fn kind(&self) -> FailureKind {
        match self {
            ApiError::Transport(_) => FailureKind::Transport,
            ApiError::MalformedResponse(_) => FailureKind::Other,
            ApiError::Provider { status, message } => classify(*status, message),
        }
    }
}

/// Map an HTTP status (plus the body text for ambiguous codes) onto a
/// [`FailureKind`].
pub fn classify(status: u16, message: &str) -> FailureKind {
    match status {
        400 => FailureKind::InvalidArgument,
        401 => FailureKind::Unauthorized,
        403 => FailureKind::Forbidden,
        429 => FailureKind::RateLimited,
        500..=599 => FailureKind::ServerError,
        _ => classify_by_phrase(message),
    }
}

/// Last-resort classification for statuses outside the table above.
fn classify_by_phrase(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if lower.contains("unauthorized") || lower.contains("invalid api key") {
        FailureKind::Unauthorized
    } else if lower.contains("quota") || lower.contains("rate limit") {
        FailureKind::RateLimited
    } else if lower.contains("forbidden") {
        FailureKind::Forbidden
    } else if lower.contains("invalid argument") || lower.contains("invalid json") {
        FailureKind::InvalidArgument
    } else {
        FailureKind::Other
    }
}
