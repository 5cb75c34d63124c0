//! Account passwords: Argon2id hashes in PHC format plus the rules every
//! new password must satisfy.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use std::sync::OnceLock;

use crate::types::{ApiError, Validator};

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 8;

/// Upper bound keeps hashing cost bounded for hostile input
pub const MAX_PASSWORD_LEN: usize = 128;

/// Rules for a new password; `confirmation` is checked when given
pub fn check_new_password(
    v: &mut Validator,
    field: &str,
    password: Option<&str>,
    confirmation: Option<Option<&str>>,
) {
    v.required(field, password)
        .min_len(field, password, MIN_PASSWORD_LEN)
        .max_len(field, password, MAX_PASSWORD_LEN);
    if let Some(confirmation) = confirmation {
        v.confirmed(field, password, confirmation);
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Auth(format!("Failed to hash password: {e}")))
}

/// `Ok(false)` on a wrong password; `Err` only for a corrupt stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::Auth(format!("Invalid password hash format: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Burn one verification against a fixed hash so a login for an unknown
/// email costs as much as one with a wrong password.
pub fn verify_unknown_user(password: &str) {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    if let Some(hash) = DUMMY.get_or_init(|| hash_password("muster-unknown-account").ok()) {
        let _ = verify_password(password, hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("σωστός-κωδικός-42").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("σωστός-κωδικός-42", &hash).unwrap());
        assert!(!verify_password("λάθος-κωδικός", &hash).unwrap());

        // Salted
        assert_ne!(hash, hash_password("σωστός-κωδικός-42").unwrap());
    }

    #[test]
    fn test_corrupt_hash_is_an_error() {
        assert!(verify_password("anything", "plaintext-in-the-db").is_err());
    }

    #[test]
    fn test_new_password_rules() {
        let mut v = Validator::new();
        check_new_password(&mut v, "password", Some("short"), Some(Some("short")));
        assert!(v.finish().is_err());

        let long = "x".repeat(MAX_PASSWORD_LEN + 1);
        let mut v = Validator::new();
        check_new_password(&mut v, "password", Some(&long), None);
        assert!(v.finish().is_err());

        let mut v = Validator::new();
        check_new_password(&mut v, "password", Some("long-enough"), Some(Some("different")));
        assert!(v.finish().is_err());

        let mut v = Validator::new();
        check_new_password(&mut v, "password", Some("long-enough"), Some(Some("long-enough")));
        assert!(v.finish().is_ok());

        let mut v = Validator::new();
        check_new_password(&mut v, "password", None, None);
        assert!(v.finish().is_err());
    }
}
