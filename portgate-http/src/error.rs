//! Error types for the execution client.

use thiserror::Error;

/// Failures surfaced by [`crate::HttpClient::execute`].
///
/// Transport failures are retried per the request's policy before being
/// returned; everything else surfaces immediately.
#[derive(Debug, Error)]
pub enum Error {
    /// The client itself could not be constructed.
    #[error("cannot build HTTP client: {source}")]
    Build {
        #[source]
        source: reqwest::Error,
    },

    /// The request URL did not parse.
    #[error("invalid request URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A header name or value was not representable on the wire. Not
    /// retryable: the request is malformed.
    #[error("invalid header {name:?}")]
    InvalidHeader { name: String },

    /// Connection-level failure after the retry schedule was exhausted.
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The caller's deadline expired before a definitive outcome. Remaining
    /// retries and backoff sleeps are abandoned.
    #[error("deadline exceeded after {attempts} attempt(s) to {url}")]
    DeadlineExceeded { url: String, attempts: u32 },
}
