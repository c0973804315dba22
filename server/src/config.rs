//! Server Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::permissions::{registry::DEFAULT_PERMISSION_FLAGS, PermissionRegistry};
use crate::problems::{EditableFields, DEFAULT_EDITABLE_FIELDS};
use crate::ratelimit::RegistrationLimitConfig;

/// Languages accepted for submissions when `ACCEPTED_LANGUAGES` is not set.
pub const DEFAULT_ACCEPTED_LANGUAGES: &str = "c,cpp,java,python3,rust";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// `SQLite` connection URL (e.g. "sqlite://judge.db")
    pub database_url: String,

    /// JWT signing secret
    pub jwt_secret: String,

    /// Token issuer and audience (default: "localhost")
    pub service_identity: String,

    /// Longest wait for the storage connection (default: 5s)
    pub storage_lock_timeout: Duration,

    /// Problems held by the problem cache (default: 128)
    pub problem_cache_capacity: usize,

    /// Rows loaded into the public catalog cache (default: 30)
    pub catalog_cache_capacity: usize,

    /// Listing page size when none is requested (default: 10)
    pub default_page_size: usize,

    /// Largest listing page size (default: 100)
    pub max_page_size: usize,

    /// Permission bit assignments
    pub permissions: PermissionRegistry,

    /// Columns editable through single-field updates
    pub editable_fields: EditableFields,

    /// Submission languages
    pub accepted_languages: Vec<String>,

    /// Registration limiter settings
    pub registration_limit: RegistrationLimitConfig,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_languages(list: &str) -> Vec<String> {
    list.split(',')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let permission_flags =
            env::var("PERMISSION_FLAGS").unwrap_or_else(|_| DEFAULT_PERMISSION_FLAGS.into());
        let editable_fields =
            env::var("EDITABLE_FIELDS").unwrap_or_else(|_| DEFAULT_EDITABLE_FIELDS.into());

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            service_identity: env::var("SERVICE_IDENTITY").unwrap_or_else(|_| "localhost".into()),
            storage_lock_timeout: Duration::from_millis(parse_or("STORAGE_LOCK_TIMEOUT_MS", 5000)),
            problem_cache_capacity: parse_or("PROBLEM_CACHE_CAPACITY", 128),
            catalog_cache_capacity: parse_or("CATALOG_CACHE_CAPACITY", 30),
            default_page_size: parse_or("DEFAULT_PAGE_SIZE", 10),
            max_page_size: parse_or("MAX_PAGE_SIZE", 100),
            permissions: PermissionRegistry::from_json(&permission_flags)
                .context("PERMISSION_FLAGS is invalid")?,
            editable_fields: EditableFields::from_json(&editable_fields)
                .context("EDITABLE_FIELDS is invalid")?,
            accepted_languages: parse_languages(
                &env::var("ACCEPTED_LANGUAGES")
                    .unwrap_or_else(|_| DEFAULT_ACCEPTED_LANGUAGES.into()),
            ),
            registration_limit: RegistrationLimitConfig::from_env(),
        })
    }

    /// Create a default configuration for testing.
    ///
    /// Uses a private in-memory `SQLite` database.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            jwt_secret: "test-secret".into(),
            service_identity: "judge.test".into(),
            storage_lock_timeout: Duration::from_millis(500),
            problem_cache_capacity: 128,
            catalog_cache_capacity: 30,
            default_page_size: 10,
            max_page_size: 100,
            permissions: PermissionRegistry::default(),
            editable_fields: EditableFields::from_json(DEFAULT_EDITABLE_FIELDS)
                .unwrap_or_default(),
            accepted_languages: parse_languages(DEFAULT_ACCEPTED_LANGUAGES),
            registration_limit: RegistrationLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_complete() {
        let config = Config::default_for_test();
        assert!(config.permissions.missing().is_empty());
        assert!(!config.editable_fields.is_empty());
        assert_eq!(
            config.accepted_languages,
            vec!["c", "cpp", "java", "python3", "rust"]
        );
    }

    #[test]
    fn languages_are_trimmed() {
        assert_eq!(parse_languages(" c , ,rust"), vec!["c", "rust"]);
    }
}
