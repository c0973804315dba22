//! Allow-list of columns the management panel may edit one at a time.
//!
//! Table and column names are spliced into SQL text, so they only ever come
//! from this list, and every name in it must be a plain identifier. Values
//! are always bound as parameters.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

/// Default allow-list used when `EDITABLE_FIELDS` is not set.
pub const DEFAULT_EDITABLE_FIELDS: &str = r#"{"problems":["title","description","input_format","output_format","difficulty"],"problem_sample_io":["sample_input","sample_output"],"problem_solutions":["title","solution"],"problem_hints":["title","hint"]}"#;

/// Tables keyed by problem: `problems` by `id`, the rest by `problem_id`.
const PROBLEM_TABLES: [&str; 4] = [
    "problems",
    "problem_sample_io",
    "problem_solutions",
    "problem_hints",
];

const KEY_COLUMNS: [&str; 2] = ["id", "problem_id"];

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").unwrap());

/// Allow-list errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("table {0} is not keyed by problem")]
    UnknownTable(String),

    #[error("key column {table}.{column} cannot be editable")]
    KeyColumn { table: String, column: String },

    #[error("{table}.{column} is not editable")]
    NotEditable { table: String, column: String },

    #[error("invalid editable fields: {0}")]
    Parse(String),
}

/// Validated `{table: [column, ...]}` allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditableFields {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl EditableFields {
    pub fn from_json(json: &str) -> Result<Self, FieldError> {
        let raw: BTreeMap<String, Vec<String>> =
            serde_json::from_str(json).map_err(|e| FieldError::Parse(e.to_string()))?;
        Self::from_map(raw)
    }

    pub fn from_map(raw: BTreeMap<String, Vec<String>>) -> Result<Self, FieldError> {
        let mut tables = BTreeMap::new();
        for (table, columns) in raw {
            if !IDENTIFIER.is_match(&table) {
                return Err(FieldError::InvalidIdentifier(table));
            }
            if !PROBLEM_TABLES.contains(&table.as_str()) {
                return Err(FieldError::UnknownTable(table));
            }

            let mut allowed = BTreeSet::new();
            for column in columns {
                if !IDENTIFIER.is_match(&column) {
                    return Err(FieldError::InvalidIdentifier(column));
                }
                if KEY_COLUMNS.contains(&column.as_str()) {
                    return Err(FieldError::KeyColumn { table, column });
                }
                allowed.insert(column);
            }
            tables.insert(table, allowed);
        }
        Ok(Self { tables })
    }

    /// Accept `table.column` only if it is on the list.
    pub fn check(&self, table: &str, column: &str) -> Result<(), FieldError> {
        if self
            .tables
            .get(table)
            .is_some_and(|columns| columns.contains(column))
        {
            Ok(())
        } else {
            Err(FieldError::NotEditable {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }

    /// Number of editable columns across all tables.
    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
