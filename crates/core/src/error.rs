use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
}

/// Classification of a failed remote call, decided once at the HTTP
/// boundary and carried as a typed value from there on.
///
/// The credential rotator and the job submitter branch on this instead
/// of re-parsing error text at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// 401: the credential itself is invalid; skip it, no backoff.
    Unauthorized,
    /// 429 or quota exhausted: back off and rotate to the next credential.
    RateLimited,
    /// 403: the credential lacks permission; skip it.
    Forbidden,
    /// 5xx: possibly transient; rotate with backoff.
    ServerError,
    /// 400: the request is malformed; rotating credentials cannot fix it.
    InvalidArgument,
    /// Network/DNS/TLS failure before any status code was produced.
    Transport,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Whether rotating to another credential could plausibly help.
    ///
    /// A malformed request fails identically on every credential, so the
    /// rotator surfaces it to the caller instead of burning the pool.
    pub fn is_credential_related(self) -> bool {
        !matches!(self, FailureKind::InvalidArgument)
    }
}
