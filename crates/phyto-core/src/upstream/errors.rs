use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when interacting with upstream classifier or
/// registry services.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Request exceeded the configured timeout duration.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the upstream endpoint.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// HTTP-level error occurred (non-2xx status code).
    ///
    /// First field is the HTTP status code, second is the error message.
    #[error("HTTP error: {0}")]
    HttpError(u16, String),

    /// Network-level error from the underlying HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The upstream's schema/connection cache is stale and needs a refresh.
    ///
    /// Some backend-as-a-service providers surface this between deploys; the
    /// call usually succeeds once the upstream rebuilds its cache.
    #[error("Upstream schema cache error: {0}")]
    SchemaCache(String),

    /// Response from upstream could not be parsed or was malformed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request validation failed before being sent to upstream.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl UpstreamError {
    /// Returns `true` if this error is transient and the call should be
    /// retried.
    ///
    /// This is an explicit allow-list, not "any error":
    /// - Timeouts (network congestion, slow upstream)
    /// - Network errors (temporary connectivity issues)
    /// - Connection failures
    /// - HTTP 5xx server errors or 429 rate limiting
    /// - Upstream schema-cache errors (recover after the upstream refreshes)
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) | Self::ConnectionFailed(_) | Self::SchemaCache(_) => {
                true
            }
            Self::HttpError(status, _) => (500..=599).contains(status) || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` if this error is permanent and retrying won't help.
    ///
    /// Permanent errors include invalid requests (caller contract
    /// violations), unparseable responses, and HTTP 4xx client errors
    /// (except 429, which is transient).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidRequest(_) | Self::InvalidResponse(_) => true,
            Self::HttpError(status, _) => (400..=499).contains(status) && *status != 429,
            _ => false,
        }
    }
}

/// Terminal outcome of a resilient invocation.
///
/// Clonable so that any number of de-duplicated callers can observe the same
/// settled failure.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum InvokeError {
    /// The transient-failure retry budget was exhausted.
    ///
    /// Deliberately distinct from the underlying error: callers treat this
    /// as "source unavailable" and fail open rather than propagating the
    /// original failure.
    #[error("{name}: retries exhausted after {attempts} attempts: {cause}")]
    RetriesExhausted { name: Arc<str>, attempts: u32, cause: Arc<UpstreamError> },

    /// The operation failed with a non-transient error and was not retried.
    #[error("upstream failure: {0}")]
    Upstream(Arc<UpstreamError>),

    /// The driving task for a de-duplicated call was aborted before it
    /// settled (runtime shutdown).
    #[error("in-flight operation aborted before settling")]
    Aborted,
}

impl InvokeError {
    pub(crate) fn upstream(error: UpstreamError) -> Self {
        Self::Upstream(Arc::new(error))
    }

    /// The underlying upstream error, when one exists.
    #[must_use]
    pub fn upstream_error(&self) -> Option<&UpstreamError> {
        match self {
            Self::RetriesExhausted { cause, .. } => Some(cause),
            Self::Upstream(cause) => Some(cause),
            Self::Aborted => None,
        }
    }

    /// Returns `true` if the retry budget was exhausted.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}
