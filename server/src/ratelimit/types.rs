//! Rate limiting types.

use serde::Serialize;

/// Result of a registration admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    /// Whether the attempt is admitted
    pub allowed: bool,
    /// Identifiers allowed per source address per day
    pub limit: u32,
    /// Identifiers still available today
    pub remaining: u32,
    /// Unix timestamp when the day bucket ends
    pub reset_at: i64,
    /// Seconds to wait before retrying (0 if allowed)
    pub retry_after: u64,
}

impl RateLimitResult {
    /// Admitted without being tracked (limiter disabled or allowlisted).
    #[must_use]
    pub const fn bypass() -> Self {
        Self {
            allowed: true,
            limit: 0,
            remaining: 0,
            reset_at: 0,
            retry_after: 0,
        }
    }
}
