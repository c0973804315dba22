//! Registration limiter configuration.

use std::collections::HashSet;

use super::constants::DEFAULT_REGISTRATION_SLOTS;

/// Configuration for the registration limiter.
#[derive(Debug, Clone)]
pub struct RegistrationLimitConfig {
    /// Whether limiting is enabled
    pub enabled: bool,
    /// Distinct identifiers per source address per day
    pub slots: usize,
    /// Whether to trust X-Forwarded-For / X-Real-IP headers
    pub trust_proxy: bool,
    /// Normalised source addresses that bypass the limiter
    pub allowlist: HashSet<String>,
}

impl Default for RegistrationLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slots: DEFAULT_REGISTRATION_SLOTS,
            trust_proxy: false,
            allowlist: HashSet::new(),
        }
    }
}

impl RegistrationLimitConfig {
    /// Creates configuration from environment variables.
    ///
    /// Environment variables:
    /// - `REGISTRATION_LIMIT_ENABLED`: Enable/disable the limiter (default: true)
    /// - `REGISTRATION_LIMIT_SLOTS`: Identifiers per address per day (default: 3)
    /// - `REGISTRATION_LIMIT_TRUST_PROXY`: Trust forwarding headers (default: false)
    /// - `REGISTRATION_LIMIT_ALLOWLIST`: Comma-separated address allowlist
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REGISTRATION_LIMIT_ENABLED") {
            config.enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("REGISTRATION_LIMIT_SLOTS") {
            config.slots = val
                .parse()
                .ok()
                .filter(|slots| *slots > 0)
                .unwrap_or(DEFAULT_REGISTRATION_SLOTS);
        }
        if let Ok(val) = std::env::var("REGISTRATION_LIMIT_TRUST_PROXY") {
            config.trust_proxy = val.parse().unwrap_or(false);
        }
        if let Ok(val) = std::env::var("REGISTRATION_LIMIT_ALLOWLIST") {
            config.allowlist = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RegistrationLimitConfig::default();
        assert!(config.enabled);
        assert_eq!(config.slots, 3);
        assert!(!config.trust_proxy);
        assert!(config.allowlist.is_empty());
    }
}
