//! Database Queries
//!
//! Runtime queries (no compile-time `DATABASE_URL` required). Every caller
//! supplied value is bound as a parameter; the only identifiers spliced into
//! SQL text come from the editable-field allow-list.
//!
//! All query functions include error context logging to aid debugging.

use sqlx::sqlite::SqliteConnection;
use sqlx::{QueryBuilder, Sqlite};
use tracing::error;

use super::models::{
    FieldValue, Hint, ManagedProblem, ProblemId, ProblemRow, ProblemSummary, RoleBinding,
    SampleIo, Solution, TestCase, User, UserId,
};

/// Log and return a database error with context.
macro_rules! db_error {
    ($query:expr, $($field:tt)*) => {
        |e| {
            error!(query = $query, $($field)*, error = %e, "Database query failed");
            e
        }
    };
}

/// Append ` IN (?, ?, ...)` binding every role name.
fn push_in_list(builder: &mut QueryBuilder<'_, Sqlite>, values: &[String]) {
    builder.push(" IN (");
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.clone());
    }
    separated.push_unseparated(")");
}

// ============================================================================
// User Queries
// ============================================================================

/// Find user by email.
pub async fn find_user_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        "SELECT id, name, tag, email, password FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error!("find_user_by_email", email = %email))
}

/// Check if an email is already registered.
pub async fn email_exists(conn: &mut SqliteConnection, email: &str) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
        .bind(email)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error!("email_exists", email = %email))
}

/// Next free discriminator tag for a display name.
pub async fn next_user_tag(conn: &mut SqliteConnection, name: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(tag), 0) + 1 FROM users WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error!("next_user_tag", name = %name))
}

/// Insert a user and return its id.
pub async fn insert_user(
    conn: &mut SqliteConnection,
    name: &str,
    tag: i64,
    email: &str,
    password_hash: &str,
) -> sqlx::Result<UserId> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (name, tag, email, password) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(tag)
    .bind(email)
    .bind(password_hash)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error!("insert_user", name = %name, tag = tag))
}

// ============================================================================
// Role Queries
// ============================================================================

/// Role names held by a user.
pub async fn user_role_names(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        "SELECT role_name FROM user_roles WHERE user_id = ? ORDER BY role_name",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error!("user_role_names", user_id = user_id))
}

/// Permission masks of every site role the user holds.
pub async fn user_site_role_flags(
    conn: &mut SqliteConnection,
    user_id: UserId,
) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>(
        r"SELECT sr.permission_flags
          FROM site_roles sr
          INNER JOIN user_roles ur ON ur.role_name = sr.role_name
          WHERE ur.user_id = ?",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error!("user_site_role_flags", user_id = user_id))
}

/// Create a role name if it does not exist yet.
pub async fn insert_role(conn: &mut SqliteConnection, name: &str) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(db_error!("insert_role", role = %name))?;
    Ok(())
}

/// Make a role a site role carrying `flags`.
pub async fn upsert_site_role(
    conn: &mut SqliteConnection,
    name: &str,
    flags: u64,
) -> sqlx::Result<()> {
    sqlx::query(
        r"INSERT INTO site_roles (role_name, permission_flags) VALUES (?, ?)
          ON CONFLICT (role_name) DO UPDATE SET permission_flags = excluded.permission_flags",
    )
    .bind(name)
    .bind(flags as i64)
    .execute(&mut *conn)
    .await
    .map_err(db_error!("upsert_site_role", role = %name))?;
    Ok(())
}

/// Grant a role to a user.
pub async fn grant_user_role(
    conn: &mut SqliteConnection,
    user_id: UserId,
    role: &str,
) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_name) VALUES (?, ?)")
        .bind(user_id)
        .bind(role)
        .execute(&mut *conn)
        .await
        .map_err(db_error!("grant_user_role", user_id = user_id, role = %role))?;
    Ok(())
}

/// Which of `names` exist as roles.
pub async fn existing_role_names(
    conn: &mut SqliteConnection,
    names: &[String],
) -> sqlx::Result<Vec<String>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT name FROM roles WHERE name");
    push_in_list(&mut builder, names);
    builder
        .build_query_scalar::<String>()
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error!("existing_role_names", count = names.len()))
}

// ============================================================================
// Role Binding Queries
// ============================================================================

/// Whether any of `roles` is bound to the problem with a bit of `mask` set.
pub async fn has_role_binding(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    roles: &[String],
    mask: u64,
) -> sqlx::Result<bool> {
    if roles.is_empty() {
        return Ok(false);
    }
    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT EXISTS(SELECT 1 FROM problem_roles WHERE problem_id = ",
    );
    builder.push_bind(problem_id);
    builder.push(" AND (permission_flags & ");
    builder.push_bind(mask as i64);
    builder.push(") != 0 AND role_name");
    push_in_list(&mut builder, roles);
    builder.push(")");

    builder
        .build_query_scalar::<bool>()
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error!("has_role_binding", problem_id = problem_id))
}

/// All role bindings of a problem.
pub async fn role_bindings(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
) -> sqlx::Result<Vec<RoleBinding>> {
    sqlx::query_as::<_, RoleBinding>(
        "SELECT role_name, permission_flags FROM problem_roles WHERE problem_id = ? ORDER BY role_name",
    )
    .bind(problem_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error!("role_bindings", problem_id = problem_id))
}

/// Bind a role to a problem.
pub async fn insert_role_binding(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    role: &str,
    flags: u64,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO problem_roles (problem_id, role_name, permission_flags) VALUES (?, ?, ?)",
    )
    .bind(problem_id)
    .bind(role)
    .bind(flags as i64)
    .execute(&mut *conn)
    .await
    .map_err(db_error!("insert_role_binding", problem_id = problem_id, role = %role))?;
    Ok(())
}

// ============================================================================
// Problem Queries
// ============================================================================

/// Find a problem row by id.
pub async fn find_problem(
    conn: &mut SqliteConnection,
    id: ProblemId,
) -> sqlx::Result<Option<ProblemRow>> {
    sqlx::query_as::<_, ProblemRow>(
        r"SELECT id, owner_id, title, description, input_format, output_format, difficulty
          FROM problems WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error!("find_problem", problem_id = id))
}

pub async fn problem_exists(conn: &mut SqliteConnection, id: ProblemId) -> sqlx::Result<bool> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM problems WHERE id = ?)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error!("problem_exists", problem_id = id))
}

pub async fn sample_io(conn: &mut SqliteConnection, id: ProblemId) -> sqlx::Result<Vec<SampleIo>> {
    sqlx::query_as::<_, SampleIo>(
        "SELECT sample_input, sample_output FROM problem_sample_io WHERE problem_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error!("sample_io", problem_id = id))
}

pub async fn solutions(conn: &mut SqliteConnection, id: ProblemId) -> sqlx::Result<Vec<Solution>> {
    sqlx::query_as::<_, Solution>(
        "SELECT title, solution FROM problem_solutions WHERE problem_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error!("solutions", problem_id = id))
}

pub async fn hints(conn: &mut SqliteConnection, id: ProblemId) -> sqlx::Result<Vec<Hint>> {
    sqlx::query_as::<_, Hint>("SELECT title, hint FROM problem_hints WHERE problem_id = ? ORDER BY id")
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error!("hints", problem_id = id))
}

/// Tag names attached to a problem.
pub async fn problem_tag_names(
    conn: &mut SqliteConnection,
    id: ProblemId,
) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar::<_, String>(
        r"SELECT t.name FROM tags t
          INNER JOIN problem_tags pt ON pt.tag_id = t.id
          WHERE pt.problem_id = ?
          ORDER BY t.name",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error!("problem_tag_names", problem_id = id))
}

/// Insert a problem row and return its id.
pub async fn insert_problem(
    conn: &mut SqliteConnection,
    owner_id: UserId,
    title: &str,
    description: &str,
    input_format: &str,
    output_format: &str,
    difficulty: &str,
) -> sqlx::Result<ProblemId> {
    sqlx::query_scalar::<_, i64>(
        r"INSERT INTO problems (owner_id, title, description, input_format, output_format, difficulty)
          VALUES (?, ?, ?, ?, ?, ?)
          RETURNING id",
    )
    .bind(owner_id)
    .bind(title)
    .bind(description)
    .bind(input_format)
    .bind(output_format)
    .bind(difficulty)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error!("insert_problem", owner_id = owner_id))
}

pub async fn insert_sample_io(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    input: &str,
    output: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO problem_sample_io (problem_id, sample_input, sample_output) VALUES (?, ?, ?)",
    )
    .bind(problem_id)
    .bind(input)
    .bind(output)
    .execute(&mut *conn)
    .await
    .map_err(db_error!("insert_sample_io", problem_id = problem_id))?;
    Ok(())
}

pub async fn insert_solution(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    title: &str,
    solution: &str,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO problem_solutions (problem_id, title, solution) VALUES (?, ?, ?)")
        .bind(problem_id)
        .bind(title)
        .bind(solution)
        .execute(&mut *conn)
        .await
        .map_err(db_error!("insert_solution", problem_id = problem_id))?;
    Ok(())
}

pub async fn insert_hint(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    title: &str,
    hint: &str,
) -> sqlx::Result<()> {
    sqlx::query("INSERT INTO problem_hints (problem_id, title, hint) VALUES (?, ?, ?)")
        .bind(problem_id)
        .bind(title)
        .bind(hint)
        .execute(&mut *conn)
        .await
        .map_err(db_error!("insert_hint", problem_id = problem_id))?;
    Ok(())
}

pub async fn insert_problem_tag(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    tag_id: i64,
) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO problem_tags (problem_id, tag_id) VALUES (?, ?)")
        .bind(problem_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .map_err(db_error!("insert_problem_tag", problem_id = problem_id, tag_id = tag_id))?;
    Ok(())
}

/// Delete a problem and every dependent row, children first.
///
/// Returns the number of problem rows removed (0 or 1).
pub async fn delete_problem_rows(conn: &mut SqliteConnection, id: ProblemId) -> sqlx::Result<u64> {
    const DEPENDENTS: [&str; 8] = [
        "DELETE FROM problem_submission_subtasks WHERE submission_id IN \
         (SELECT id FROM problem_submissions WHERE problem_id = ?)",
        "DELETE FROM problem_submissions WHERE problem_id = ?",
        "DELETE FROM problem_sample_io WHERE problem_id = ?",
        "DELETE FROM problem_solutions WHERE problem_id = ?",
        "DELETE FROM problem_hints WHERE problem_id = ?",
        "DELETE FROM problem_test_cases WHERE problem_id = ?",
        "DELETE FROM problem_tags WHERE problem_id = ?",
        "DELETE FROM problem_roles WHERE problem_id = ?",
    ];

    for statement in DEPENDENTS {
        sqlx::query(statement)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_error!("delete_problem_rows", problem_id = id, statement = statement))?;
    }

    let result = sqlx::query("DELETE FROM problems WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(db_error!("delete_problem_rows", problem_id = id))?;
    Ok(result.rows_affected())
}

/// Set one allow-listed column on a problem or one of its sub-tables.
///
/// `table` and `column` must already be validated against the allow-list.
pub async fn update_problem_field(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    problem_id: ProblemId,
    value: &FieldValue,
) -> sqlx::Result<u64> {
    let key = if table == "problems" { "id" } else { "problem_id" };

    let mut builder = QueryBuilder::<Sqlite>::new(format!("UPDATE {table} SET {column} = "));
    match value {
        FieldValue::Integer(v) => builder.push_bind(*v),
        FieldValue::Text(v) => builder.push_bind(v.clone()),
    };
    builder.push(format!(" WHERE {key} = "));
    builder.push_bind(problem_id);

    let result = builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(db_error!("update_problem_field", problem_id = problem_id, table = %table, column = %column))?;
    Ok(result.rows_affected())
}

// ============================================================================
// Listing Queries
// ============================================================================

/// Append the visibility predicate: some role in `roles` holds a bit of `mask`.
fn push_visible_filter(builder: &mut QueryBuilder<'_, Sqlite>, roles: &[String], mask: u64) {
    builder.push(
        " WHERE EXISTS (SELECT 1 FROM problem_roles r WHERE r.problem_id = p.id AND (r.permission_flags & ",
    );
    builder.push_bind(mask as i64);
    builder.push(") != 0 AND r.role_name");
    push_in_list(builder, roles);
    builder.push(")");
}

/// Page of problems visible to `roles`, ordered by id. `None` lists all.
pub async fn list_problem_summaries(
    conn: &mut SqliteConnection,
    visible_to: Option<(&[String], u64)>,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<ProblemSummary>> {
    let mut builder =
        QueryBuilder::<Sqlite>::new("SELECT p.id, p.title, p.difficulty FROM problems p");
    if let Some((roles, mask)) = visible_to {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        push_visible_filter(&mut builder, roles, mask);
    }
    builder.push(" ORDER BY p.id LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    builder
        .build_query_as::<ProblemSummary>()
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error!("list_problem_summaries", limit = limit, offset = offset))
}

/// Number of problems visible to `roles`. `None` counts all.
pub async fn count_problems(
    conn: &mut SqliteConnection,
    visible_to: Option<(&[String], u64)>,
) -> sqlx::Result<i64> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM problems p");
    if let Some((roles, mask)) = visible_to {
        if roles.is_empty() {
            return Ok(0);
        }
        push_visible_filter(&mut builder, roles, mask);
    }

    builder
        .build_query_scalar::<i64>()
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error!("count_problems", filtered = visible_to.is_some()))
}

/// Management listing with owner names. `None` lists all.
pub async fn list_managed_problems(
    conn: &mut SqliteConnection,
    editable_by: Option<(&[String], u64)>,
    limit: i64,
    offset: i64,
) -> sqlx::Result<Vec<ManagedProblem>> {
    let mut builder = QueryBuilder::<Sqlite>::new(
        r"SELECT p.id, u.name AS owner_name, p.title, p.difficulty
          FROM problems p
          INNER JOIN users u ON u.id = p.owner_id",
    );
    if let Some((roles, mask)) = editable_by {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        push_visible_filter(&mut builder, roles, mask);
    }
    builder.push(" ORDER BY p.id LIMIT ");
    builder.push_bind(limit);
    builder.push(" OFFSET ");
    builder.push_bind(offset);

    builder
        .build_query_as::<ManagedProblem>()
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error!("list_managed_problems", limit = limit, offset = offset))
}

// ============================================================================
// Tag Queries
// ============================================================================

/// Create a tag and return its id.
pub async fn insert_tag(conn: &mut SqliteConnection, name: &str) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>("INSERT INTO tags (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_error!("insert_tag", tag = %name))
}

/// Which of `ids` exist as tags.
pub async fn existing_tag_ids(conn: &mut SqliteConnection, ids: &[i64]) -> sqlx::Result<Vec<i64>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM tags WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    builder
        .build_query_scalar::<i64>()
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error!("existing_tag_ids", count = ids.len()))
}

// ============================================================================
// Test Case Queries
// ============================================================================

pub async fn test_cases(conn: &mut SqliteConnection, problem_id: ProblemId) -> sqlx::Result<Vec<TestCase>> {
    sqlx::query_as::<_, TestCase>(
        r"SELECT id, problem_id, input, output, time_limit, memory_limit, score
          FROM problem_test_cases WHERE problem_id = ? ORDER BY id",
    )
    .bind(problem_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_error!("test_cases", problem_id = problem_id))
}

pub async fn insert_test_case(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    input: &str,
    output: &str,
    time_limit: i64,
    memory_limit: i64,
    score: i64,
) -> sqlx::Result<()> {
    sqlx::query(
        r"INSERT INTO problem_test_cases (problem_id, input, output, time_limit, memory_limit, score)
          VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(problem_id)
    .bind(input)
    .bind(output)
    .bind(time_limit)
    .bind(memory_limit)
    .bind(score)
    .execute(&mut *conn)
    .await
    .map_err(db_error!("insert_test_case", problem_id = problem_id))?;
    Ok(())
}

/// Remove every test case of a problem. Returns the number removed.
pub async fn delete_test_cases(conn: &mut SqliteConnection, problem_id: ProblemId) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM problem_test_cases WHERE problem_id = ?")
        .bind(problem_id)
        .execute(&mut *conn)
        .await
        .map_err(db_error!("delete_test_cases", problem_id = problem_id))?;
    Ok(result.rows_affected())
}

// ============================================================================
// Submission Queries
// ============================================================================

/// Record a pending submission and return its id.
pub async fn insert_submission(
    conn: &mut SqliteConnection,
    problem_id: ProblemId,
    user_id: UserId,
    language: &str,
    source_code: &str,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r"INSERT INTO problem_submissions (problem_id, user_id, language, source_code)
          VALUES (?, ?, ?, ?)
          RETURNING id",
    )
    .bind(problem_id)
    .bind(user_id)
    .bind(language)
    .bind(source_code)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error!("insert_submission", problem_id = problem_id, user_id = user_id))
}

pub async fn submission_status(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar::<_, String>("SELECT status FROM problem_submissions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error!("submission_status", submission_id = id))
}
