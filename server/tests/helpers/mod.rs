//! Reusable test helpers for service integration tests.
//!
//! Provides `TestApp`, an `AppState` over a private in-memory `SQLite`
//! database, plus seeding utilities for users, roles, tags and problems.
#![allow(dead_code)]

use judge_server::auth::accounts::issue_for_user;
use judge_server::config::Config;
use judge_server::db::{self, ProblemId, UserId};
use judge_server::permissions::{Caller, Permission, PermissionRegistry};
use judge_server::problems::{NewProblem, NewTestCase, SCORE_BUDGET};
use judge_server::AppState;

/// Stored for seeded users so seeding skips hashing. No password matches
/// it; accounts that must log in go through registration.
pub const SEEDED_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2VlZGVkc2FsdA$placeholder";

/// Application state over a fresh database.
pub struct TestApp {
    pub state: AppState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::default_for_test()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let state = AppState::new(config)
            .await
            .expect("Failed to build test state");
        Self { state }
    }

    /// Insert a user directly. The email is derived from `name`.
    pub async fn create_user(&self, name: &str) -> UserId {
        let mut conn = self.state.storage.acquire().await.unwrap();
        let tag = db::next_user_tag(&mut conn, name).await.unwrap();
        db::insert_user(
            &mut conn,
            name,
            tag,
            &format!("{name}.{tag}@example.com"),
            SEEDED_PASSWORD_HASH,
        )
        .await
        .unwrap()
    }

    /// Give `user_id` membership of `role`, creating the role if needed.
    pub async fn grant(&self, user_id: UserId, role: &str) {
        let mut conn = self.state.storage.acquire().await.unwrap();
        db::insert_role(&mut conn, role).await.unwrap();
        db::grant_user_role(&mut conn, user_id, role).await.unwrap();
    }

    /// Make `user_id` a site administrator.
    pub async fn make_admin(&self, user_id: UserId) {
        {
            let mut conn = self.state.storage.acquire().await.unwrap();
            db::insert_role(&mut conn, "admin").await.unwrap();
            db::upsert_site_role(&mut conn, "admin", 1).await.unwrap();
        }
        self.grant(user_id, "admin").await;
    }

    /// Freshly issued token for `user_id`.
    pub async fn token(&self, user_id: UserId) -> String {
        let mut conn = self.state.storage.acquire().await.unwrap();
        issue_for_user(&mut conn, &self.state, user_id).await.unwrap()
    }

    /// Caller resolved from a freshly issued token.
    pub async fn caller(&self, user_id: UserId) -> Caller {
        let token = self.token(user_id).await;
        self.state.caller(Some(&token)).unwrap()
    }

    /// Insert a bare problem row.
    pub async fn insert_problem(&self, owner: UserId, title: &str) -> ProblemId {
        let mut conn = self.state.storage.acquire().await.unwrap();
        db::insert_problem(&mut conn, owner, title, "desc", "in", "out", "Easy")
            .await
            .unwrap()
    }

    /// Bind `role` to `problem_id` with `flags`, creating the role if needed.
    pub async fn bind(&self, problem_id: ProblemId, role: &str, flags: u64) {
        let mut conn = self.state.storage.acquire().await.unwrap();
        db::insert_role(&mut conn, role).await.unwrap();
        db::insert_role_binding(&mut conn, problem_id, role, flags)
            .await
            .unwrap();
    }

    /// Problem visible to everyone, with one solution.
    pub async fn public_problem(&self, owner: UserId, title: &str) -> ProblemId {
        let id = self.insert_problem(owner, title).await;
        self.bind(id, "everyone", bit(Permission::View) | bit(Permission::Submit))
            .await;
        let mut conn = self.state.storage.acquire().await.unwrap();
        db::insert_solution(&mut conn, id, "Official", "print(42)")
            .await
            .unwrap();
        id
    }

    pub async fn create_tag(&self, name: &str) -> i64 {
        let mut conn = self.state.storage.acquire().await.unwrap();
        db::insert_tag(&mut conn, name).await.unwrap()
    }

    /// Rows in `table`. Only called with fixed table names.
    pub async fn count_rows(&self, table: &str) -> i64 {
        let mut conn = self.state.storage.acquire().await.unwrap();
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut *conn)
            .await
            .unwrap()
    }
}

/// Mask of `permission` under the default registry.
pub fn bit(permission: Permission) -> u64 {
    PermissionRegistry::default().mask(permission).unwrap()
}

/// Test case set that exactly spends the score budget.
pub fn budget_cases(n: i64) -> Vec<NewTestCase> {
    (0..n)
        .map(|i| NewTestCase {
            input: format!("{i}"),
            output: format!("{i}"),
            time_limit: 1000,
            memory_limit: 256,
            score: if i == 0 {
                SCORE_BUDGET - (n - 1) * (SCORE_BUDGET / n)
            } else {
                SCORE_BUDGET / n
            },
        })
        .collect()
}

/// Creation request that passes every check.
pub fn new_problem(title: &str) -> NewProblem {
    NewProblem {
        title: title.into(),
        description: "Add two numbers".into(),
        input_format: "a b".into(),
        output_format: "a+b".into(),
        difficulty: "Medium".into(),
        sample_inputs: vec!["1 2".into()],
        sample_outputs: vec!["3".into()],
        solutions: Vec::new(),
        hints: Vec::new(),
        tags: Vec::new(),
        testcases: budget_cases(3),
        roles: Vec::new(),
    }
}
