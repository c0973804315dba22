//! Rate limiting error types.

use crate::ratelimit::RateLimitResult;

/// Errors that can occur during rate limit checks.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The source address used up its identifiers for today.
    #[error("Too many registrations. Wait {} seconds.", .0.retry_after)]
    LimitExceeded(RateLimitResult),
}

impl RateLimitError {
    /// Seconds until the next day bucket.
    #[must_use]
    pub const fn retry_after(&self) -> u64 {
        match self {
            Self::LimitExceeded(result) => result.retry_after,
        }
    }
}
