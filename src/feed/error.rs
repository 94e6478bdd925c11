use thiserror::Error;

/// Coarse failure categories used for diagnostics.
///
/// Several [`ResolveError`] variants collapse onto the same kind: a caller
/// usually only cares whether the network failed, the body was unusable, or
/// the cascade simply found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection, status, timeout, cancellation or size-limit failure
    Transport,
    /// The response body could not be read
    Decode,
    /// The body was too short to classify
    ShortBody,
    /// A search result page could not be parsed
    Parse,
    /// The cascade ran to completion without a hit
    NoCandidates,
}

/// Errors that can occur while resolving an address to a feed.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// HTTP request failed (DNS, connection, TLS, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request or resolution exceeded its deadline
    #[error("request timed out")]
    Timeout,
    /// The caller cancelled the resolution
    #[error("resolution cancelled")]
    Cancelled,
    /// Response body exceeded the configured size limit
    #[error("response too large")]
    TooLarge,
    /// The address could not be turned into a request
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// Reading the response body failed part-way through
    #[error("failed to read response body: {0}")]
    Decode(#[source] reqwest::Error),
    /// Body too short to carry an XML prologue
    #[error("body too short to classify ({len} bytes)")]
    ShortBody { len: usize },
    /// Search result page could not be parsed
    #[error("parse error: {0}")]
    Parse(String),
    /// No search keyword could be derived from the address
    #[error("no search keyword derivable from address")]
    NoKeyword,
    /// Every stage of the cascade came back empty
    #[error("no feed found")]
    NoCandidates,
}

impl ResolveError {
    /// Maps this error onto its taxonomy kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::Network(_)
            | ResolveError::HttpStatus(_)
            | ResolveError::Timeout
            | ResolveError::Cancelled
            | ResolveError::TooLarge
            | ResolveError::InvalidUrl(_) => ErrorKind::Transport,
            ResolveError::Decode(_) => ErrorKind::Decode,
            ResolveError::ShortBody { .. } => ErrorKind::ShortBody,
            ResolveError::Parse(_) => ErrorKind::Parse,
            ResolveError::NoKeyword | ResolveError::NoCandidates => ErrorKind::NoCandidates,
        }
    }

    /// True if the whole resolution should stop rather than move on to the
    /// next candidate or stage.
    pub(crate) fn is_abort(&self) -> bool {
        matches!(self, ResolveError::Cancelled)
    }
}
