//! Password hashing with Argon2.

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use tracing::instrument;

use super::AccountError;

/// Hashes a password into a PHC string with a fresh random salt.
#[instrument(skip(password))]
pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountError::Unavailable {
            reason: format!("failed to hash password: {e}"),
        })
}

/// Checks a password against a stored PHC string.
///
/// A malformed stored hash never verifies.
#[instrument(skip(password, stored))]
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
