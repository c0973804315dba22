//! Problem catalog: read paths, management writes and submissions.

pub mod fields;
pub mod service;
pub mod submissions;
pub mod types;
pub mod writes;

pub use fields::{EditableFields, FieldError, DEFAULT_EDITABLE_FIELDS};
pub use service::{get_problem, list_manageable, list_problems, list_test_cases, load_record};
pub use submissions::{accepted_languages, submit, SubmitRequest};
pub use types::*;
pub use writes::{
    create_problem, delete_problem, delete_test_cases, replace_test_cases, update_field,
};
