//! Transactional management writes.
//!
//! Every write runs in one storage transaction. A validation failure or a
//! storage error rolls the whole sequence back, so callers never observe a
//! partly written problem. Cache entries touched by a write are dropped
//! before the commit is acknowledged.

use std::collections::BTreeSet;

use sqlx::SqliteConnection;
use tracing::{error, info, instrument};
use validator::Validate;

use super::types::{check_test_cases, Difficulty, NewProblem, NewTestCase};
use crate::db::{self, FieldValue, ProblemId, Transaction, UserId};
use crate::error::{ServiceError, ServiceResult};
use crate::permissions::{Caller, Permission};
use crate::state::AppState;

/// Roll back after `cause`, logging a rollback that fails too.
async fn abort(tx: Transaction, cause: &ServiceError) {
    if let Err(e) = tx.rollback().await {
        error!(error = %e, cause = %cause, "Rollback failed");
    }
}

/// Create a problem with all of its parts. Any authenticated caller may.
#[instrument(skip(state, caller, request), fields(user_id = ?caller.user_id))]
pub async fn create_problem(
    state: &AppState,
    caller: &Caller,
    request: NewProblem,
) -> ServiceResult<ProblemId> {
    let owner = caller.require_user()?;
    request.validate()?;

    let mut tx = state.storage.begin().await?;
    match insert_problem(&mut tx, owner, &request).await {
        Ok(id) => {
            state.catalog_cache.reset();
            tx.commit().await?;
            info!(problem_id = id, "Problem created");
            Ok(id)
        }
        Err(e) => {
            abort(tx, &e).await;
            Err(e)
        }
    }
}

async fn insert_problem(
    conn: &mut SqliteConnection,
    owner: UserId,
    request: &NewProblem,
) -> ServiceResult<ProblemId> {
    let difficulty: Difficulty = request
        .difficulty
        .parse()
        .map_err(ServiceError::Validation)?;

    let id = db::insert_problem(
        conn,
        owner,
        &request.title,
        &request.description,
        &request.input_format,
        &request.output_format,
        difficulty.as_str(),
    )
    .await?;

    if request.sample_inputs.len() != request.sample_outputs.len() {
        return Err(ServiceError::Validation(format!(
            "Got {} sample inputs but {} sample outputs",
            request.sample_inputs.len(),
            request.sample_outputs.len()
        )));
    }
    for (input, output) in request.sample_inputs.iter().zip(&request.sample_outputs) {
        db::insert_sample_io(conn, id, input, output).await?;
    }

    for solution in &request.solutions {
        db::insert_solution(conn, id, &solution.title, &solution.solution).await?;
    }
    for hint in &request.hints {
        db::insert_hint(conn, id, &hint.title, &hint.hint).await?;
    }

    let known: BTreeSet<i64> = db::existing_tag_ids(conn, &request.tags)
        .await?
        .into_iter()
        .collect();
    if let Some(unknown) = request.tags.iter().find(|t| !known.contains(t)) {
        return Err(ServiceError::Validation(format!("Unknown tag id {unknown}")));
    }
    for tag in &request.tags {
        db::insert_problem_tag(conn, id, *tag).await?;
    }

    insert_test_cases(conn, id, &request.testcases).await?;

    let names: Vec<String> = request.roles.iter().map(|r| r.role_name.clone()).collect();
    let known: BTreeSet<String> = db::existing_role_names(conn, &names)
        .await?
        .into_iter()
        .collect();
    for binding in &request.roles {
        if !known.contains(&binding.role_name) {
            return Err(ServiceError::Validation(format!(
                "Unknown role {}",
                binding.role_name
            )));
        }
        if i64::try_from(binding.permission_flags).is_err() {
            return Err(ServiceError::Validation(format!(
                "Permission flags for role {} use the sign bit",
                binding.role_name
            )));
        }
        db::insert_role_binding(conn, id, &binding.role_name, binding.permission_flags).await?;
    }

    Ok(id)
}

async fn insert_test_cases(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    cases: &[NewTestCase],
) -> ServiceResult<()> {
    check_test_cases(cases).map_err(ServiceError::Validation)?;
    for case in cases {
        db::insert_test_case(
            conn,
            problem_id,
            &case.input,
            &case.output,
            case.time_limit,
            case.memory_limit,
            case.score,
        )
        .await?;
    }
    Ok(())
}

/// Delete a problem and everything that hangs off it. Requires `delete`.
#[instrument(skip(state, caller), fields(user_id = ?caller.user_id))]
pub async fn delete_problem(state: &AppState, caller: &Caller, id: ProblemId) -> ServiceResult<()> {
    state.require(caller, id, Permission::Delete).await?;

    let mut tx = state.storage.begin().await?;
    let deleted = match db::delete_problem_rows(&mut tx, id).await {
        Ok(deleted) => deleted,
        Err(e) => {
            let e = ServiceError::from(e);
            abort(tx, &e).await;
            return Err(e);
        }
    };
    if deleted == 0 {
        let e = ServiceError::NotFound;
        abort(tx, &e).await;
        return Err(e);
    }

    state.problem_cache.invalidate(id);
    state.catalog_cache.reset();
    tx.commit().await?;

    info!(problem_id = id, "Problem deleted");
    Ok(())
}

/// Set one allow-listed column of a problem or of its sample I/O,
/// solutions or hints. Requires `edit`.
#[instrument(skip(state, caller, value), fields(user_id = ?caller.user_id))]
pub async fn update_field(
    state: &AppState,
    caller: &Caller,
    id: ProblemId,
    table: &str,
    column: &str,
    value: FieldValue,
) -> ServiceResult<()> {
    state.config.editable_fields.check(table, column)?;
    if (table, column) == ("problems", "difficulty") {
        match &value {
            FieldValue::Text(text) => {
                text.parse::<Difficulty>().map_err(ServiceError::Validation)?;
            }
            FieldValue::Integer(_) => {
                return Err(ServiceError::Validation("Difficulty must be text".into()));
            }
        }
    }
    state.require(caller, id, Permission::Edit).await?;

    let mut tx = state.storage.begin().await?;
    let updated = match update_rows(&mut tx, id, table, column, &value).await {
        Ok(updated) => updated,
        Err(e) => {
            abort(tx, &e).await;
            return Err(e);
        }
    };

    state.problem_cache.invalidate(id);
    state.catalog_cache.reset();
    tx.commit().await?;

    info!(problem_id = id, table, column, updated, "Problem field updated");
    Ok(())
}

async fn update_rows(
    conn: &mut SqliteConnection,
    id: ProblemId,
    table: &str,
    column: &str,
    value: &FieldValue,
) -> ServiceResult<u64> {
    if !db::problem_exists(conn, id).await? {
        return Err(ServiceError::NotFound);
    }
    Ok(db::update_problem_field(conn, table, column, id, value).await?)
}

/// Swap the whole test case set of a problem. Requires `edit`.
#[instrument(skip(state, caller, cases), fields(user_id = ?caller.user_id))]
pub async fn replace_test_cases(
    state: &AppState,
    caller: &Caller,
    id: ProblemId,
    cases: Vec<NewTestCase>,
) -> ServiceResult<()> {
    state.require(caller, id, Permission::Edit).await?;

    let mut tx = state.storage.begin().await?;
    if let Err(e) = swap_test_cases(&mut tx, id, &cases).await {
        abort(tx, &e).await;
        return Err(e);
    }
    tx.commit().await?;

    info!(problem_id = id, count = cases.len(), "Test cases replaced");
    Ok(())
}

/// Remove every test case of a problem. Requires `edit`.
///
/// Returns how many were removed.
#[instrument(skip(state, caller), fields(user_id = ?caller.user_id))]
pub async fn delete_test_cases(
    state: &AppState,
    caller: &Caller,
    id: ProblemId,
) -> ServiceResult<u64> {
    state.require(caller, id, Permission::Edit).await?;

    let mut tx = state.storage.begin().await?;
    let result = remove_test_cases(&mut tx, id).await;

    match result {
        Ok(removed) => {
            tx.commit().await?;
            info!(problem_id = id, removed, "Test cases deleted");
            Ok(removed)
        }
        Err(e) => {
            abort(tx, &e).await;
            Err(e)
        }
    }
}

async fn swap_test_cases(
    conn: &mut SqliteConnection,
    id: ProblemId,
    cases: &[NewTestCase],
) -> ServiceResult<()> {
    if !db::problem_exists(conn, id).await? {
        return Err(ServiceError::NotFound);
    }
    db::delete_test_cases(conn, id).await?;
    insert_test_cases(conn, id, cases).await
}

async fn remove_test_cases(conn: &mut SqliteConnection, id: ProblemId) -> ServiceResult<u64> {
    if !db::problem_exists(conn, id).await? {
        return Err(ServiceError::NotFound);
    }
    Ok(db::delete_test_cases(conn, id).await?)
}
