//! Error states and the sleep-duration policy between polls.

use std::time::Duration;

use serde::Serialize;

use crate::usage::FetchError;

/// Sleep while the session cookie is rejected
pub const AUTH_EXPIRED_SLEEP: Duration = Duration::from_secs(3600);
/// Sleep after a 429; the advertised Retry-After is only reported
pub const RATE_LIMITED_SLEEP: Duration = Duration::from_secs(120);
/// Upper bound on exponential backoff sleeps
pub const MAX_BACKOFF_SLEEP: Duration = Duration::from_secs(1800);
/// Upper bound on the backoff multiplier
pub const MAX_MULTIPLIER: u32 = 6;

/// Error state shown to the user; exactly one is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorState {
    #[default]
    None,
    AuthExpired,
    RateLimited,
    NetworkError,
    GenericError,
}

impl ErrorState {
    /// Whether this state represents a failure
    pub fn is_error(self) -> bool {
        self != ErrorState::None
    }

    /// Transient failures that use exponential backoff
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorState::NetworkError | ErrorState::GenericError)
    }

    /// Stable identifier for logs
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorState::None => "none",
            ErrorState::AuthExpired => "auth_expired",
            ErrorState::RateLimited => "rate_limited",
            ErrorState::NetworkError => "network_error",
            ErrorState::GenericError => "generic_error",
        }
    }
}

impl From<&FetchError> for ErrorState {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Auth { .. } => ErrorState::AuthExpired,
            FetchError::RateLimited { .. } => ErrorState::RateLimited,
            FetchError::Network(_) => ErrorState::NetworkError,
            FetchError::Api(_) => ErrorState::GenericError,
        }
    }
}

/// Consecutive-failure multiplier applied to the base interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    multiplier: u32,
}

impl Backoff {
    /// Start at multiplier 1
    pub fn new() -> Self {
        Self { multiplier: 1 }
    }

    /// Current multiplier
    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Compute the sleep before the next poll and advance the multiplier.
    ///
    /// | state | sleep |
    /// |---|---|
    /// | healthy | `base` |
    /// | auth expired | 3600s |
    /// | rate limited | 120s |
    /// | network / generic | `min(base * multiplier, 1800s)`, then multiplier doubles (max 6) |
    ///
    /// Healthy, auth-expired and rate-limited states reset the multiplier to 1.
    pub fn next_sleep(&mut self, state: ErrorState, base: Duration) -> Duration {
        match state {
            ErrorState::None => {
                self.multiplier = 1;
                base
            }
            ErrorState::AuthExpired => {
                self.multiplier = 1;
                AUTH_EXPIRED_SLEEP
            }
            ErrorState::RateLimited => {
                self.multiplier = 1;
                RATE_LIMITED_SLEEP
            }
            ErrorState::NetworkError | ErrorState::GenericError => {
                let sleep = base.saturating_mul(self.multiplier).min(MAX_BACKOFF_SLEEP);
                self.multiplier = (self.multiplier * 2).min(MAX_MULTIPLIER);
                sleep
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(300);

    #[test]
    fn test_healthy_uses_base_interval() {
        let mut b = Backoff::new();
        assert_eq!(b.next_sleep(ErrorState::None, BASE), BASE);
        assert_eq!(b.multiplier(), 1);
    }

    #[test]
    fn test_network_error_sequence() {
        let mut b = Backoff::new();
        assert_eq!(
            b.next_sleep(ErrorState::NetworkError, BASE),
            Duration::from_secs(300)
        );
        assert_eq!(b.multiplier(), 2);
        assert_eq!(
            b.next_sleep(ErrorState::NetworkError, BASE),
            Duration::from_secs(600)
        );
        assert_eq!(b.multiplier(), 4);
        assert_eq!(
            b.next_sleep(ErrorState::GenericError, BASE),
            Duration::from_secs(1200)
        );
        assert_eq!(b.multiplier(), 6);
        // 300 * 6 = 1800, at the cap
        assert_eq!(
            b.next_sleep(ErrorState::GenericError, BASE),
            Duration::from_secs(1800)
        );
        assert_eq!(b.multiplier(), 6);
    }

    #[test]
    fn test_backoff_capped_at_max_sleep() {
        let mut b = Backoff::new();
        let base = Duration::from_secs(900);
        b.next_sleep(ErrorState::NetworkError, base);
        assert_eq!(
            b.next_sleep(ErrorState::NetworkError, base),
            MAX_BACKOFF_SLEEP
        );
    }

    #[test]
    fn test_auth_expired_fixed_and_resets_multiplier() {
        let mut b = Backoff::new();
        b.next_sleep(ErrorState::NetworkError, BASE);
        b.next_sleep(ErrorState::NetworkError, BASE);
        assert_eq!(b.multiplier(), 4);

        assert_eq!(
            b.next_sleep(ErrorState::AuthExpired, BASE),
            Duration::from_secs(3600)
        );
        assert_eq!(b.multiplier(), 1);
    }

    #[test]
    fn test_rate_limited_fixed() {
        let mut b = Backoff::new();
        b.next_sleep(ErrorState::NetworkError, BASE);
        assert_eq!(
            b.next_sleep(ErrorState::RateLimited, BASE),
            Duration::from_secs(120)
        );
        assert_eq!(b.multiplier(), 1);
        // Still 120s after repeated 429s, whatever the server advertised
        assert_eq!(
            b.next_sleep(ErrorState::RateLimited, BASE),
            RATE_LIMITED_SLEEP
        );
        assert_eq!(b.multiplier(), 1);
    }

    #[test]
    fn test_success_resets_multiplier() {
        let mut b = Backoff::new();
        b.next_sleep(ErrorState::NetworkError, BASE);
        b.next_sleep(ErrorState::NetworkError, BASE);
        b.next_sleep(ErrorState::None, BASE);
        assert_eq!(b.multiplier(), 1);
        assert_eq!(
            b.next_sleep(ErrorState::NetworkError, BASE),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_error_state_from_fetch_error() {
        assert_eq!(
            ErrorState::from(&FetchError::Auth { status: 403 }),
            ErrorState::AuthExpired
        );
        assert_eq!(
            ErrorState::from(&FetchError::RateLimited {
                retry_after_secs: 60
            }),
            ErrorState::RateLimited
        );
        assert_eq!(
            ErrorState::from(&FetchError::Network("timeout".into())),
            ErrorState::NetworkError
        );
        assert_eq!(
            ErrorState::from(&FetchError::Api("HTTP 500".into())),
            ErrorState::GenericError
        );
        assert!(ErrorState::NetworkError.is_transient());
        assert!(!ErrorState::AuthExpired.is_transient());
        assert!(!ErrorState::None.is_error());
    }
}
