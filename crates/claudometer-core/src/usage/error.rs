//! Fetch error taxonomy.

/// Why a usage fetch failed.
///
/// Classification drives the poller's backoff policy, so every transport or
/// HTTP outcome maps to exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Credential rejected (HTTP 401/403); only the user can fix this
    #[error("session cookie expired or invalid (HTTP {status})")]
    Auth { status: u16 },

    /// Server-imposed cooldown (HTTP 429)
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Connection failure or timeout
    #[error("network error: {0}")]
    Network(String),

    /// Any other non-2xx status or unreadable response
    #[error("API error: {0}")]
    Api(String),
}
