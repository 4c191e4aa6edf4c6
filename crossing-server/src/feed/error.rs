//! Train feed error types.

/// Errors from fetching the upstream train feed.
///
/// None of these escape the read path: the fetch contract maps them to an
/// empty list and the cache keeps serving what it already holds.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// HTTP request failed (connection error, body read error)
    #[error("HTTP error: {0}")]
    Transport(reqwest::Error),

    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Upstream returned a non-2xx status
    #[error("upstream error {status}: {body}")]
    Status { status: u16, body: String },

    /// Failed to parse a JSON response
    #[error("JSON parse error: {message}")]
    Json { message: String },

    /// Upstream returned an empty body
    #[error("upstream returned an empty payload")]
    EmptyPayload,

    /// Client could not be configured
    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Transport(err)
        }
    }
}
