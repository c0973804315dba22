//! Permission system types and utilities.
//!
//! Two-tier permission model:
//! - Site permissions: a bitmask aggregated from site roles into the token
//! - Problem permissions: per-problem role bindings stored in `problem_roles`

pub mod evaluator;
pub mod registry;
pub mod site;

pub use evaluator::{BindingStore, Caller, EvaluationError, Evaluator, PUBLIC_ROLE};
pub use registry::{Domain, Permission, PermissionRegistry, RegistryError};
pub use site::SiteFlags;
