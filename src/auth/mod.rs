//! Authentication and authorization for Muster
//!
//! Provides:
//! - JWT access/refresh token generation and validation
//! - Password hashing with Argon2
//! - Roles and per-record authorization policies

pub mod jwt;
pub mod password;
pub mod permissions;

pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenKind, TokenPair};
pub use password::{
    check_new_password, hash_password, verify_password, verify_unknown_user, MIN_PASSWORD_LEN,
};
pub use permissions::{Actor, Role};
