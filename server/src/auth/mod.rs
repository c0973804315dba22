//! Authentication Service
//!
//! Local accounts, password hashing and stateless token issuance.

pub mod accounts;
mod error;
pub mod jwt;
mod password;

pub use accounts::{login, register, AuthResponse, LoginRequest, RegisterRequest};
pub use error::{AuthError, AuthResult, ErrorResponse};
pub use jwt::{Claims, TokenService, TOKEN_TTL_SECONDS};
pub use password::{hash_password, verify_password};
