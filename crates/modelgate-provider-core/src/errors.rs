use std::error::Error;
use std::fmt;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failures a provider implementation can hand back to the failover
/// executor. The executor decides retriability from the variant, not from
/// inspecting an arbitrary status code, so every upstream-facing error must
/// be classified at the point it's produced.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Connect/read/write failure before any status line was observed.
    /// Always retriable against the next candidate.
    Network(String),
    /// The per-attempt deadline (`timeoutMs`) elapsed. Always retriable.
    Timeout,
    /// A status line was read. `retriable` mirrors
    /// `retriableStatusCodes = {429,500,502,503,504}`; non-retriable
    /// statuses are returned to the client verbatim instead of triggering
    /// failover.
    Status {
        status: u16,
        body: bytes::Bytes,
        retriable: bool,
    },
    /// The provider integration itself is misconfigured (bad base URL,
    /// missing credential, unsupported dialect for this provider type).
    /// Not a retriable-by-failover condition; it means every attempt
    /// against this candidate would fail identically.
    InvalidConfig(String),
    Other(String),
}

impl ProviderError {
    pub fn is_retriable(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::Timeout => true,
            ProviderError::Status { retriable, .. } => *retriable,
            ProviderError::InvalidConfig(_) | ProviderError::Other(_) => false,
        }
    }

    pub fn retriable_status(status: u16, body: bytes::Bytes) -> Self {
        let retriable = matches!(status, 429 | 500 | 502 | 503 | 504);
        ProviderError::Status { status, body, retriable }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Network(msg) => write!(f, "network error: {msg}"),
            ProviderError::Timeout => write!(f, "upstream timeout"),
            ProviderError::Status { status, .. } => write!(f, "upstream status {status}"),
            ProviderError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            ProviderError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error for ProviderError {}
