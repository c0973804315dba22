//! Day-bucketed registration limiter.
//!
//! Each source address may register up to `slots` distinct identifiers per
//! day bucket (epoch seconds / 86400). Retrying an identifier already
//! recorded is always admitted. All state is dropped when the day changes;
//! this is a coarse daily reset, not a sliding window.
//!
//! State lives in process memory only and is lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::ratelimit::{
    RateLimitError, RateLimitResult, RegistrationLimitConfig, SECONDS_PER_DAY,
};

#[derive(Debug)]
struct Buckets {
    /// Day index of the last reset.
    day: i64,
    /// Source address -> identifiers seen today, in arrival order.
    sources: HashMap<String, Vec<String>>,
}

/// Admission control for registrations.
#[derive(Debug, Clone)]
pub struct RegistrationLimiter {
    config: Arc<RegistrationLimitConfig>,
    buckets: Arc<Mutex<Buckets>>,
}

impl RegistrationLimiter {
    pub fn new(config: RegistrationLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            buckets: Arc::new(Mutex::new(Buckets {
                day: i64::MIN,
                sources: HashMap::new(),
            })),
        }
    }

    pub fn config(&self) -> &RegistrationLimitConfig {
        &self.config
    }

    /// Check and record an attempt by `source` for `identifier`.
    pub fn check(&self, source: &str, identifier: &str) -> Result<RateLimitResult, RateLimitError> {
        self.check_at(source, identifier, Utc::now())
    }

    /// [`Self::check`] at an explicit point in time.
    #[tracing::instrument(skip(self, now))]
    pub fn check_at(
        &self,
        source: &str,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitResult, RateLimitError> {
        if !self.config.enabled {
            return Ok(RateLimitResult::bypass());
        }
        if self.config.allowlist.contains(source) {
            debug!("Source in allowlist, bypassing registration limit");
            return Ok(RateLimitResult::bypass());
        }

        let secs = now.timestamp();
        let day = secs.div_euclid(SECONDS_PER_DAY);
        let reset_at = (day + 1) * SECONDS_PER_DAY;
        let limit = self.config.slots;

        // Reset and check under one lock.
        let mut buckets = self.buckets.lock();
        if buckets.day != day {
            if !buckets.sources.is_empty() {
                debug!(tracked = buckets.sources.len(), "Day bucket changed, clearing");
            }
            buckets.sources.clear();
            buckets.day = day;
        }

        let seen = buckets.sources.entry(source.to_string()).or_default();
        let known = seen.iter().any(|s| s == identifier);
        if !known && seen.len() >= limit {
            let retry_after = (reset_at - secs).max(1) as u64;
            warn!(retry_after, "Registration limit exceeded");
            return Err(RateLimitError::LimitExceeded(RateLimitResult {
                allowed: false,
                limit: limit as u32,
                remaining: 0,
                reset_at,
                retry_after,
            }));
        }
        if !known {
            seen.push(identifier.to_string());
        }

        Ok(RateLimitResult {
            allowed: true,
            limit: limit as u32,
            remaining: limit.saturating_sub(seen.len()) as u32,
            reset_at,
            retry_after: 0,
        })
    }

    /// Number of source addresses tracked in the current bucket.
    pub fn tracked_sources(&self) -> usize {
        self.buckets.lock().sources.len()
    }
}
