//! Submission recording.

mod helpers;

use helpers::TestApp;
use judge_server::permissions::Caller;
use judge_server::problems::{accepted_languages, submit, SubmitRequest};
use judge_server::ServiceError;

fn request(problem_id: i64, language: &str) -> SubmitRequest {
    SubmitRequest {
        problem_id,
        language: language.into(),
        source_code: "fn main() {}".into(),
    }
}

#[tokio::test]
async fn records_pending_submission() {
    let app = TestApp::new().await;
    let user = app.create_user("solver").await;
    let id = app.public_problem(user, "Sum").await;
    let caller = app.caller(user).await;

    let submission = submit(&app.state, &caller, request(id, "rust")).await.unwrap();

    let mut conn = app.state.storage.acquire().await.unwrap();
    let status = judge_server::db::submission_status(&mut conn, submission)
        .await
        .unwrap();
    assert_eq!(status.as_deref(), Some("pending"));
}

#[tokio::test]
async fn rejects_bad_submissions() {
    let app = TestApp::new().await;
    let user = app.create_user("solver").await;
    let open = app.public_problem(user, "Open").await;
    let closed = app.insert_problem(user, "Closed").await;
    let caller = app.caller(user).await;

    assert!(accepted_languages(&app.state).iter().any(|l| l == "rust"));

    let err = submit(&app.state, &caller, request(open, "cobol")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = submit(&app.state, &caller, request(closed, "rust")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden));

    let err = submit(&app.state, &Caller::anonymous(), request(open, "rust"))
        .await
        .unwrap_err();
    assert_eq!(err.status().0.as_u16(), 401);

    assert_eq!(app.count_rows("problem_submissions").await, 0);
}
