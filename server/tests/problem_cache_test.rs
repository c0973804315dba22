//! Problem reads through the permission-aware cache.

mod helpers;

use helpers::{bit, TestApp};
use judge_server::db::FieldValue;
use judge_server::permissions::{Caller, Permission};
use judge_server::problems::{get_problem, update_field};

#[tokio::test]
async fn miss_then_hit() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner").await;
    let id = app.public_problem(owner, "Sum").await;

    assert!(app.state.problem_cache.is_empty());
    let first = get_problem(&app.state, &Caller::anonymous(), id).await.unwrap();
    assert_eq!(app.state.problem_cache.len(), 1);

    let second = get_problem(&app.state, &Caller::anonymous(), id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.title, "Sum");
}

#[tokio::test]
async fn redaction_is_per_caller_whoever_populated() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner").await;
    let solver = app.create_user("solver").await;
    app.grant(solver, "tester").await;

    let id = app.public_problem(owner, "Sum").await;
    app.bind(id, "tester", bit(Permission::ViewSolutions)).await;
    let privileged = app.caller(solver).await;
    let anonymous = Caller::anonymous();

    // Privileged caller populates, anonymous reads the cached entry.
    let full = get_problem(&app.state, &privileged, id).await.unwrap();
    let redacted = get_problem(&app.state, &anonymous, id).await.unwrap();
    assert_eq!(full.solutions.as_ref().map(Vec::len), Some(1));
    assert!(redacted.solutions.is_none());

    // Other order, after eviction.
    app.state.problem_cache.invalidate(id);
    let redacted = get_problem(&app.state, &anonymous, id).await.unwrap();
    let full = get_problem(&app.state, &privileged, id).await.unwrap();
    assert!(redacted.solutions.is_none());
    assert_eq!(full.solutions.as_ref().map(Vec::len), Some(1));

    assert_eq!(full.title, redacted.title);
    assert_eq!(full.sample_io, redacted.sample_io);
}

#[tokio::test]
async fn roles_only_for_editors() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner").await;
    let editor = app.create_user("editor").await;
    app.grant(editor, "editor").await;

    let id = app.public_problem(owner, "Sum").await;
    app.bind(id, "editor", bit(Permission::Edit)).await;

    let as_editor = get_problem(&app.state, &app.caller(editor).await, id)
        .await
        .unwrap();
    let roles = as_editor.roles.expect("editor sees bindings");
    assert!(roles.iter().any(|b| b.role_name == "editor"));

    let as_public = get_problem(&app.state, &Caller::anonymous(), id).await.unwrap();
    assert!(as_public.roles.is_none());
}

#[tokio::test]
async fn revoked_binding_applies_to_cached_entry() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner").await;
    let id = app.public_problem(owner, "Sum").await;
    app.bind(id, "tester", bit(Permission::ViewSolutions)).await;
    let tester = app.create_user("tester").await;
    app.grant(tester, "tester").await;
    let caller = app.caller(tester).await;

    let view = get_problem(&app.state, &caller, id).await.unwrap();
    assert!(view.solutions.is_some());

    {
        let mut conn = app.state.storage.acquire().await.unwrap();
        sqlx::query("DELETE FROM problem_roles WHERE role_name = 'tester'")
            .execute(&mut *conn)
            .await
            .unwrap();
    }

    // Entry still cached, decision re-derived.
    assert_eq!(app.state.problem_cache.len(), 1);
    let view = get_problem(&app.state, &caller, id).await.unwrap();
    assert!(view.solutions.is_none());
}

#[tokio::test]
async fn write_evicts_before_next_read() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner").await;
    let admin = app.create_user("root").await;
    app.make_admin(admin).await;
    let admin = app.caller(admin).await;

    let id = app.public_problem(owner, "Old title").await;
    get_problem(&app.state, &Caller::anonymous(), id).await.unwrap();
    assert_eq!(app.state.problem_cache.len(), 1);

    update_field(
        &app.state,
        &admin,
        id,
        "problems",
        "title",
        FieldValue::Text("New title".into()),
    )
    .await
    .unwrap();
    assert!(app.state.problem_cache.lookup(id).is_none());

    let view = get_problem(&app.state, &Caller::anonymous(), id).await.unwrap();
    assert_eq!(view.title, "New title");
}

#[tokio::test]
async fn capacity_evicts_least_recently_used() {
    let mut config = judge_server::config::Config::default_for_test();
    config.problem_cache_capacity = 2;
    let app = TestApp::with_config(config).await;
    let owner = app.create_user("owner").await;
    let anonymous = Caller::anonymous();

    let a = app.public_problem(owner, "A").await;
    let b = app.public_problem(owner, "B").await;
    let c = app.public_problem(owner, "C").await;

    get_problem(&app.state, &anonymous, a).await.unwrap();
    get_problem(&app.state, &anonymous, b).await.unwrap();
    get_problem(&app.state, &anonymous, a).await.unwrap();
    get_problem(&app.state, &anonymous, c).await.unwrap();

    assert_eq!(app.state.problem_cache.len(), 2);
    assert!(app.state.problem_cache.lookup(a).is_some());
    assert!(app.state.problem_cache.lookup(b).is_none());
    assert!(app.state.problem_cache.lookup(c).is_some());
}

#[tokio::test]
async fn denied_caller_never_touches_cache() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner").await;
    let id = app.insert_problem(owner, "Private").await;

    assert!(get_problem(&app.state, &Caller::anonymous(), id).await.is_err());
    assert!(app.state.problem_cache.is_empty());
}
