//! Judge Server
//!
//! Access control and read acceleration for an online-judge problem
//! catalog: role-bound problem permissions, stateless tokens,
//! permission-aware caching, registration rate limiting and transactional
//! management writes over a single `SQLite` connection.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod permissions;
pub mod problems;
pub mod ratelimit;
pub mod state;

pub use error::{ServiceError, ServiceResult};
pub use state::AppState;
