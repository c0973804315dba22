//! Problem payloads and write requests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::{Hint, ProblemId, ProblemRow, RoleBinding, SampleIo, Solution, UserId};

/// Sum of test case scores every problem must reach exactly.
pub const SCORE_BUDGET: i64 = 10_000;

/// Problem difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Easy" => Ok(Self::Easy),
            "Medium" => Ok(Self::Medium),
            "Hard" => Ok(Self::Hard),
            other => Err(format!("Invalid difficulty {other:?}, expected Easy, Medium or Hard")),
        }
    }
}

/// Full problem as stored: every sub-field, including privileged ones.
///
/// This is what the problem cache holds. It is never returned to a caller
/// directly; see [`ProblemRecord::view`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemRecord {
    pub id: ProblemId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub input_format: String,
    pub output_format: String,
    pub difficulty: String,
    pub sample_io: Vec<SampleIo>,
    pub hints: Vec<Hint>,
    pub tags: Vec<String>,
    pub solutions: Vec<Solution>,
    pub roles: Vec<RoleBinding>,
}

impl ProblemRecord {
    #[must_use]
    pub fn from_parts(
        row: ProblemRow,
        sample_io: Vec<SampleIo>,
        hints: Vec<Hint>,
        tags: Vec<String>,
        solutions: Vec<Solution>,
        roles: Vec<RoleBinding>,
    ) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            input_format: row.input_format,
            output_format: row.output_format,
            difficulty: row.difficulty,
            sample_io,
            hints,
            tags,
            solutions,
            roles,
        }
    }

    /// Copy for one caller, keeping privileged fields only where allowed.
    #[must_use]
    pub fn view(&self, show_solutions: bool, show_roles: bool) -> ProblemView {
        ProblemView {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title.clone(),
            description: self.description.clone(),
            input_format: self.input_format.clone(),
            output_format: self.output_format.clone(),
            difficulty: self.difficulty.clone(),
            sample_io: self.sample_io.clone(),
            hints: self.hints.clone(),
            tags: self.tags.clone(),
            solutions: show_solutions.then(|| self.solutions.clone()),
            roles: show_roles.then(|| self.roles.clone()),
        }
    }
}

/// Problem as returned to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemView {
    pub id: ProblemId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub input_format: String,
    pub output_format: String,
    pub difficulty: String,
    pub sample_io: Vec<SampleIo>,
    pub hints: Vec<Hint>,
    pub tags: Vec<String>,
    /// Present only with `view_solutions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solutions: Option<Vec<Solution>>,
    /// Present only with `edit`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<RoleBinding>>,
}

/// Test case in a create or replace request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTestCase {
    pub input: String,
    pub output: String,
    /// Milliseconds.
    pub time_limit: i64,
    /// Megabytes.
    pub memory_limit: i64,
    pub score: i64,
}

/// Role binding in a create request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRoleBinding {
    pub role_name: String,
    pub permission_flags: u64,
}

/// Problem creation request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProblem {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub input_format: String,
    pub output_format: String,
    pub difficulty: String,
    #[serde(default)]
    pub sample_inputs: Vec<String>,
    #[serde(default)]
    pub sample_outputs: Vec<String>,
    #[serde(default)]
    pub solutions: Vec<Solution>,
    #[serde(default)]
    pub hints: Vec<Hint>,
    /// Tag ids.
    #[serde(default)]
    pub tags: Vec<i64>,
    #[validate(length(min = 1))]
    pub testcases: Vec<NewTestCase>,
    #[serde(default)]
    pub roles: Vec<NewRoleBinding>,
}

/// Validate per-case limits and the score budget.
pub fn check_test_cases(cases: &[NewTestCase]) -> Result<(), String> {
    for (i, case) in cases.iter().enumerate() {
        if case.time_limit <= 0 || case.memory_limit <= 0 || case.score <= 0 {
            return Err(format!(
                "Invalid test case {i}: time limit, memory limit and score must be positive"
            ));
        }
    }
    let total: i64 = cases.iter().map(|c| c.score).sum();
    if total != SCORE_BUDGET {
        return Err(format!(
            "Total score of test cases must be {SCORE_BUDGET}, got {total}"
        ));
    }
    Ok(())
}
