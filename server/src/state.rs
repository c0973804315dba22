//! Application State
//!
//! The service context built once at startup and passed by reference to
//! every operation.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::info;

use crate::auth::TokenService;
use crate::cache::{CatalogCache, ProblemCache};
use crate::config::Config;
use crate::db::{ProblemId, Storage, StorageError};
use crate::error::{ServiceError, ServiceResult};
use crate::permissions::{Caller, Evaluator, Permission, PermissionRegistry};
use crate::ratelimit::RegistrationLimiter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Serialized storage handle
    pub storage: Storage,
    /// Token signing and verification
    pub tokens: TokenService,
    /// Permission decisions over stored role bindings
    pub evaluator: Evaluator,
    /// Full problem records, redacted per read
    pub problem_cache: Arc<ProblemCache>,
    /// Public catalog prefix
    pub catalog_cache: Arc<CatalogCache>,
    /// Registration admission control
    pub limiter: RegistrationLimiter,
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

impl AppState {
    /// Open storage, apply migrations and build the context.
    pub async fn new(config: Config) -> Result<Self, StorageError> {
        let storage = Storage::connect(&config.database_url, config.storage_lock_timeout).await?;
        storage.run_migrations().await?;
        Ok(Self::with_storage(config, storage))
    }

    /// Build the context over an already migrated storage handle.
    #[must_use]
    pub fn with_storage(config: Config, storage: Storage) -> Self {
        let registry = Arc::new(config.permissions.clone());
        let state = Self {
            tokens: TokenService::new(&config.jwt_secret, &config.service_identity),
            evaluator: Evaluator::new(registry, storage.clone()),
            problem_cache: Arc::new(ProblemCache::new(capacity(config.problem_cache_capacity))),
            catalog_cache: Arc::new(CatalogCache::new(capacity(config.catalog_cache_capacity))),
            limiter: RegistrationLimiter::new(config.registration_limit.clone()),
            storage,
            config: Arc::new(config),
        };

        info!(
            problem_cache = state.problem_cache.capacity(),
            catalog_cache = state.config.catalog_cache_capacity,
            "Application state ready"
        );
        state
    }

    #[must_use]
    pub fn registry(&self) -> &PermissionRegistry {
        self.evaluator.registry()
    }

    /// Resolve the caller behind an optional raw token.
    ///
    /// No token is the anonymous caller. Unlike
    /// [`Evaluator::authorize_token`], a bad token is reported so the
    /// request can be answered with 401.
    pub fn caller(&self, token: Option<&str>) -> ServiceResult<Caller> {
        match token {
            None => Ok(Caller::anonymous()),
            Some(token) => Ok(self.tokens.authenticate(token)?),
        }
    }

    /// Fail with `Forbidden` unless `caller` holds `permission` on `problem_id`.
    pub async fn require(
        &self,
        caller: &Caller,
        problem_id: ProblemId,
        permission: Permission,
    ) -> ServiceResult<()> {
        if self.evaluator.authorize(caller, problem_id, permission).await? {
            Ok(())
        } else {
            Err(ServiceError::Forbidden)
        }
    }
}
