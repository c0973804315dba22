//! Rate limiting constants.

/// Length of one day bucket.
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Distinct identifiers one source address may register per day bucket.
pub const DEFAULT_REGISTRATION_SLOTS: usize = 3;

/// IPv6 addresses are grouped by this prefix length.
pub const IPV6_PREFIX_BITS: u32 = 64;
