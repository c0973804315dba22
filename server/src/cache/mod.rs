//! In-process read caches.
//!
//! Both caches hold content only. Authorization is evaluated on every read.

pub mod catalog_cache;
pub mod problem_cache;

pub use catalog_cache::{CatalogCache, Page, PageSource};
pub use problem_cache::{redact, ProblemCache};
