//! Submissions.
//!
//! Only recording is handled here. Judging happens elsewhere and moves the
//! row out of `pending`.

use serde::Deserialize;
use tracing::{info, instrument};
use validator::Validate;

use crate::db::{self, ProblemId};
use crate::error::{ServiceError, ServiceResult};
use crate::permissions::{Caller, Permission};
use crate::state::AppState;

/// Submission request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitRequest {
    pub problem_id: ProblemId,
    pub language: String,
    #[validate(length(min = 1, max = 65536))]
    pub source_code: String,
}

/// Languages submissions may use.
#[must_use]
pub fn accepted_languages(state: &AppState) -> &[String] {
    &state.config.accepted_languages
}

/// Record a pending submission and return its id.
///
/// Requires an authenticated caller holding `submit` on the problem.
#[instrument(skip(state, caller, request), fields(user_id = ?caller.user_id, problem_id = request.problem_id))]
pub async fn submit(
    state: &AppState,
    caller: &Caller,
    request: SubmitRequest,
) -> ServiceResult<i64> {
    let user_id = caller.require_user()?;
    request.validate()?;
    if !accepted_languages(state).contains(&request.language) {
        return Err(ServiceError::Validation(format!(
            "Language {} is not accepted",
            request.language
        )));
    }
    state
        .require(caller, request.problem_id, Permission::Submit)
        .await?;

    let mut conn = state.storage.acquire().await?;
    if !db::problem_exists(&mut conn, request.problem_id).await? {
        return Err(ServiceError::NotFound);
    }
    let id = db::insert_submission(
        &mut conn,
        request.problem_id,
        user_id,
        &request.language,
        &request.source_code,
    )
    .await?;

    info!(submission_id = id, language = %request.language, "Submission recorded");
    Ok(id)
}
