//! Problem read paths.

use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use super::types::{ProblemRecord, ProblemView};
use crate::cache::{redact, Page, PageSource};
use crate::db::{self, ManagedProblem, ProblemId, ProblemSummary, TestCase};
use crate::error::{ServiceError, ServiceResult};
use crate::permissions::{Caller, EvaluationError, Permission};
use crate::state::AppState;

/// One problem as `caller` may see it.
///
/// The `view` check runs before the cache is consulted, so a caller
/// without it learns nothing about whether the problem exists or is cached.
#[instrument(skip(state, caller), fields(user_id = ?caller.user_id))]
pub async fn get_problem(
    state: &AppState,
    caller: &Caller,
    id: ProblemId,
) -> ServiceResult<ProblemView> {
    state.require(caller, id, Permission::View).await?;

    if let Some(view) = state.problem_cache.get(id, caller, &state.evaluator).await? {
        return Ok(view);
    }

    let epoch = state.problem_cache.begin_load();
    let record = {
        let mut conn = state.storage.acquire().await?;
        load_record(&mut conn, id).await?
    };
    let record = Arc::new(record.ok_or(ServiceError::NotFound)?);
    state.problem_cache.populate_if_current(epoch, id, Arc::clone(&record));

    Ok(redact(&record, caller, &state.evaluator).await?)
}

/// Assemble the full record from the problem row and its sub-tables.
pub async fn load_record(
    conn: &mut SqliteConnection,
    id: ProblemId,
) -> Result<Option<ProblemRecord>, sqlx::Error> {
    let Some(row) = db::find_problem(conn, id).await? else {
        return Ok(None);
    };
    let sample_io = db::sample_io(conn, id).await?;
    let hints = db::hints(conn, id).await?;
    let tags = db::problem_tag_names(conn, id).await?;
    let solutions = db::solutions(conn, id).await?;
    let roles = db::role_bindings(conn, id).await?;

    debug!(problem_id = id, "Loaded problem from storage");
    Ok(Some(ProblemRecord::from_parts(
        row, sample_io, hints, tags, solutions, roles,
    )))
}

/// `(per_page, offset)` for a 1-based page request.
fn page_window(
    state: &AppState,
    page: Option<usize>,
    per_page: Option<usize>,
) -> ServiceResult<(usize, usize)> {
    let per_page = per_page
        .unwrap_or(state.config.default_page_size)
        .clamp(1, state.config.max_page_size.max(1));
    let page = page.unwrap_or(1);
    if page == 0 {
        return Err(ServiceError::Validation("Page numbers start at 1".into()));
    }
    let offset = (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| ServiceError::Validation("Page out of range".into()))?;
    // Storage offsets are signed. Nothing lives that far out.
    if i64::try_from(offset).is_err() {
        return Err(ServiceError::NotFound);
    }
    Ok((per_page, offset))
}

fn mask(state: &AppState, permission: Permission) -> ServiceResult<u64> {
    state
        .registry()
        .mask(permission)
        .map_err(|e| EvaluationError::from(e).into())
}

/// One page of the problems `caller` may view.
///
/// `page` is 1-based. An empty page is `NotFound`.
#[instrument(skip(state, caller), fields(user_id = ?caller.user_id))]
pub async fn list_problems(
    state: &AppState,
    caller: &Caller,
    page: Option<usize>,
    per_page: Option<usize>,
) -> ServiceResult<Page<ProblemSummary>> {
    let (per_page, offset) = page_window(state, page, per_page)?;
    let view_mask = mask(state, Permission::View)?;

    let page = state
        .catalog_cache
        .serve_page(&state.storage, caller, view_mask, per_page, offset)
        .await?;

    if page.items.is_empty() {
        return Err(ServiceError::NotFound);
    }
    Ok(page)
}

/// Problems `caller` may edit, for the management panel.
///
/// Administrators see everything.
#[instrument(skip(state, caller), fields(user_id = ?caller.user_id))]
pub async fn list_manageable(
    state: &AppState,
    caller: &Caller,
    per_page: usize,
    offset: usize,
) -> ServiceResult<Page<ManagedProblem>> {
    caller.require_user()?;
    let per_page = per_page.clamp(1, state.config.max_page_size.max(1));
    let edit_mask = mask(state, Permission::Edit)?;

    let roles = caller.role_list();
    let editable_by = (!caller.is_admin()).then_some((roles.as_slice(), edit_mask));

    let mut conn = state.storage.acquire().await?;
    let items = db::list_managed_problems(
        &mut conn,
        editable_by,
        i64::try_from(per_page).unwrap_or(i64::MAX),
        i64::try_from(offset).unwrap_or(i64::MAX),
    )
    .await?;
    let total = db::count_problems(&mut conn, editable_by).await?;

    Ok(Page {
        items,
        total,
        source: PageSource::Storage,
    })
}

/// Test cases of a problem. Requires `edit`.
#[instrument(skip(state, caller), fields(user_id = ?caller.user_id))]
pub async fn list_test_cases(
    state: &AppState,
    caller: &Caller,
    id: ProblemId,
) -> ServiceResult<Vec<TestCase>> {
    state.require(caller, id, Permission::Edit).await?;

    let mut conn = state.storage.acquire().await?;
    if !db::problem_exists(&mut conn, id).await? {
        return Err(ServiceError::NotFound);
    }
    Ok(db::test_cases(&mut conn, id).await?)
}
