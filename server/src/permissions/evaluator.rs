//! Authorization decisions.
//!
//! Resolution order for `(caller, problem, permission)`:
//! 1. Site administrator bit set: allowed, no storage access
//! 2. No roles: denied
//! 3. Allowed iff one of the caller's roles is bound to the problem with the
//!    permission's bit set
//!
//! Decisions are never cached. Every call re-derives the answer from the
//! caller's claims and the current bindings.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument};

use super::registry::{Permission, PermissionRegistry, RegistryError};
use super::site::SiteFlags;
use crate::auth::{AuthError, AuthResult, Claims, TokenService};
use crate::db::{self, ProblemId, Storage, StorageError, UserId};

/// Role implicitly held by every caller, including anonymous ones.
pub const PUBLIC_ROLE: &str = "everyone";

/// Evaluation failed before a decision could be reached.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("permission lookup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("binding lookup failed: {0}")]
    Storage(#[from] StorageError),
}

/// Identity and rights of whoever is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<UserId>,
    pub roles: BTreeSet<String>,
    pub site_flags: SiteFlags,
}

impl Caller {
    #[must_use]
    pub fn new<I, S>(user_id: Option<UserId>, roles: I, site_flags: SiteFlags) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id,
            roles: roles.into_iter().map(Into::into).collect(),
            site_flags,
        }
    }

    /// Caller without a token: only the public role.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(None, [PUBLIC_ROLE], SiteFlags::empty())
    }

    /// Caller described by verified claims. The public role is always added.
    pub fn from_claims(claims: &Claims) -> AuthResult<Self> {
        let mut caller = Self::new(
            Some(claims.user_id()?),
            claims.roles.iter().cloned(),
            claims.site_flags(),
        );
        caller.roles.insert(PUBLIC_ROLE.to_string());
        Ok(caller)
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.site_flags.is_admin()
    }

    /// Whether the caller holds any role besides the public one.
    #[must_use]
    pub fn has_extra_roles(&self) -> bool {
        self.roles.iter().any(|r| r != PUBLIC_ROLE)
    }

    #[must_use]
    pub fn role_list(&self) -> Vec<String> {
        self.roles.iter().cloned().collect()
    }

    /// User id of an authenticated caller.
    pub fn require_user(&self) -> AuthResult<UserId> {
        self.user_id.ok_or(AuthError::Unauthenticated)
    }
}

/// Source of resource role bindings.
pub trait BindingStore: Send + Sync {
    /// Whether any of `roles` is bound to `problem_id` with a bit of `mask`.
    fn has_binding(
        &self,
        problem_id: ProblemId,
        roles: &[String],
        mask: u64,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;
}

impl BindingStore for Storage {
    async fn has_binding(
        &self,
        problem_id: ProblemId,
        roles: &[String],
        mask: u64,
    ) -> Result<bool, StorageError> {
        let mut conn = self.acquire().await?;
        Ok(db::has_role_binding(&mut conn, problem_id, roles, mask).await?)
    }
}

/// Decides access for callers against problems.
#[derive(Debug, Clone)]
pub struct Evaluator<B = Storage> {
    registry: Arc<PermissionRegistry>,
    store: B,
}

impl<B: BindingStore> Evaluator<B> {
    pub const fn new(registry: Arc<PermissionRegistry>, store: B) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    /// Whether `caller` holds `permission` on `problem_id`.
    #[instrument(skip(self, caller), fields(user_id = ?caller.user_id))]
    pub async fn authorize(
        &self,
        caller: &Caller,
        problem_id: ProblemId,
        permission: Permission,
    ) -> Result<bool, EvaluationError> {
        if caller.is_admin() {
            debug!("Administrator bypass");
            return Ok(true);
        }
        if caller.roles.is_empty() {
            return Ok(false);
        }

        let mask = self.registry.mask(permission)?;
        let allowed = self
            .store
            .has_binding(problem_id, &caller.role_list(), mask)
            .await?;

        debug!(allowed, "Evaluated role bindings");
        Ok(allowed)
    }

    /// Authorize straight from an optional raw token.
    ///
    /// No token means the anonymous caller. A token that fails verification
    /// is a denial rather than an error.
    pub async fn authorize_token(
        &self,
        tokens: &TokenService,
        token: Option<&str>,
        problem_id: ProblemId,
        permission: Permission,
    ) -> Result<bool, EvaluationError> {
        let caller = match token.map(|t| tokens.authenticate(t)) {
            None => Caller::anonymous(),
            Some(Ok(caller)) => caller,
            Some(Err(e)) => {
                debug!(error = %e, "Rejected token");
                return Ok(false);
            }
        };
        self.authorize(&caller, problem_id, permission).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::permissions::Domain;

    /// In-memory bindings that count lookups.
    #[derive(Default)]
    struct MockStore {
        bindings: HashMap<(ProblemId, String), u64>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockStore {
        fn with(problem: ProblemId, role: &str, flags: u64) -> Self {
            let mut store = Self::default();
            store.bindings.insert((problem, role.to_string()), flags);
            store
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl BindingStore for MockStore {
        async fn has_binding(
            &self,
            problem_id: ProblemId,
            roles: &[String],
            mask: u64,
        ) -> Result<bool, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StorageError::Busy(Duration::from_millis(1)));
            }
            Ok(roles.iter().any(|r| {
                self.bindings
                    .get(&(problem_id, r.clone()))
                    .is_some_and(|flags| flags & mask != 0)
            }))
        }
    }

    fn evaluator(store: MockStore) -> Evaluator<MockStore> {
        Evaluator::new(Arc::new(PermissionRegistry::default()), store)
    }

    fn caller(roles: &[&str], flags: u64) -> Caller {
        Caller::new(Some(1), roles.iter().copied(), SiteFlags::from_bits_retain(flags))
    }

    #[tokio::test]
    async fn editor_scenario() {
        // edit = bit 0, view_solutions = bit 1, delete = bit 2
        let eval = evaluator(MockStore::with(42, "editor", 0b11));
        let editor = caller(&["editor"], 0);

        assert!(eval.authorize(&editor, 42, Permission::Edit).await.unwrap());
        assert!(eval.authorize(&editor, 42, Permission::ViewSolutions).await.unwrap());
        assert!(!eval.authorize(&editor, 42, Permission::Delete).await.unwrap());
        assert!(!eval.authorize(&editor, 43, Permission::Edit).await.unwrap());
    }

    #[tokio::test]
    async fn agrees_with_direct_bit_test() {
        let registry = PermissionRegistry::default();
        for flags in [0u64, 0b1, 0b1010, 0b11111, 0b10100] {
            let eval = evaluator(MockStore::with(7, "r", flags));
            let c = caller(&["r"], 0);
            for p in [
                Permission::Edit,
                Permission::ViewSolutions,
                Permission::Delete,
                Permission::View,
                Permission::Submit,
            ] {
                let bit = registry.bit_index(Domain::Problems, p).unwrap();
                let expected = flags & (1 << bit) != 0;
                assert_eq!(
                    eval.authorize(&c, 7, p).await.unwrap(),
                    expected,
                    "flags={flags:#b} permission={p}"
                );
            }
        }
    }

    #[tokio::test]
    async fn administrator_skips_storage() {
        let eval = evaluator(MockStore::default());
        let admin = caller(&[], 0b1);

        for p in Permission::ALL {
            assert!(eval.authorize(&admin, 99, p).await.unwrap());
        }
        assert_eq!(eval.store.calls(), 0);
    }

    #[tokio::test]
    async fn no_roles_is_denied_without_storage() {
        let eval = evaluator(MockStore::with(1, "editor", !0));
        let nobody = Caller::new(Some(5), Vec::<String>::new(), SiteFlags::empty());

        assert!(!eval.authorize(&nobody, 1, Permission::View).await.unwrap());
        assert_eq!(eval.store.calls(), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_distinct_from_denial() {
        let store = MockStore {
            fail: true,
            ..MockStore::default()
        };
        let eval = evaluator(store);
        let result = eval.authorize(&caller(&["editor"], 0), 1, Permission::Edit).await;
        assert!(matches!(result, Err(EvaluationError::Storage(_))));
    }

    #[tokio::test]
    async fn unknown_permission_is_evaluation_error() {
        let registry = PermissionRegistry::from_json(r#"{"problems":{"view":3}}"#).unwrap();
        let eval = Evaluator::new(Arc::new(registry), MockStore::default());
        let result = eval.authorize(&caller(&["editor"], 0), 1, Permission::Edit).await;
        assert!(matches!(result, Err(EvaluationError::Registry(_))));
    }

    #[tokio::test]
    async fn authorize_token_paths() {
        let tokens = TokenService::new("secret", "judge.test");
        let eval = evaluator(MockStore::with(3, PUBLIC_ROLE, 1 << 3));

        // No token: public role only.
        assert!(eval.authorize_token(&tokens, None, 3, Permission::View).await.unwrap());
        assert!(!eval.authorize_token(&tokens, None, 3, Permission::Edit).await.unwrap());

        // Garbage token: denied, not an error.
        assert!(!eval
            .authorize_token(&tokens, Some("garbage"), 3, Permission::View)
            .await
            .unwrap());

        let admin = tokens.issue(1, &[], SiteFlags::ADMINISTRATOR).unwrap();
        assert!(eval
            .authorize_token(&tokens, Some(&admin), 3, Permission::Delete)
            .await
            .unwrap());
    }

    #[test]
    fn caller_roles() {
        let anon = Caller::anonymous();
        assert!(!anon.has_extra_roles());
        assert!(matches!(anon.require_user(), Err(AuthError::Unauthenticated)));

        let member = caller(&[PUBLIC_ROLE, "setter"], 0);
        assert!(member.has_extra_roles());
        assert_eq!(member.require_user().unwrap(), 1);
    }
}
