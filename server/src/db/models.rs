//! Database Models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Problem identifier (SQLite rowid).
pub type ProblemId = i64;

/// User identifier (SQLite rowid).
pub type UserId = i64;

/// User model.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub tag: i64,
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
}

/// Problem row without its sub-tables.
#[derive(Debug, Clone, FromRow)]
pub struct ProblemRow {
    pub id: ProblemId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub input_format: String,
    pub output_format: String,
    pub difficulty: String,
}

/// Sample input/output pair shown with the statement.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SampleIo {
    pub sample_input: String,
    pub sample_output: String,
}

/// Reference solution. Privileged: only visible with `view_solutions`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Solution {
    pub title: String,
    pub solution: String,
}

/// Hint.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Hint {
    pub title: String,
    pub hint: String,
}

/// Resource-scoped role binding: `(problem, role) -> permission bitmask`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RoleBinding {
    pub role_name: String,
    #[sqlx(try_from = "i64")]
    pub permission_flags: u64,
}

/// Catalog listing entry.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ProblemSummary {
    pub id: ProblemId,
    pub title: String,
    pub difficulty: String,
}

/// Management panel listing entry.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct ManagedProblem {
    pub id: ProblemId,
    pub owner_name: String,
    pub title: String,
    pub difficulty: String,
}

/// Scoring unit of a problem.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct TestCase {
    pub id: i64,
    pub problem_id: ProblemId,
    pub input: String,
    pub output: String,
    /// Milliseconds.
    pub time_limit: i64,
    /// Megabytes.
    pub memory_limit: i64,
    pub score: i64,
}

/// Value written by a single-field update. Always bound as a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}
