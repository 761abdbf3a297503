use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password hash error: {0}")]
    PasswordHashError(String),
}

/// One-way credential contract: `hash_password` produces an opaque digest and
/// `verify_password` checks a candidate against it. Callers never inspect the
/// digest beyond storing it on the aggregate.
pub trait PasswordScheme: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    fn verify_password(&self, password: &str, digest: &str) -> bool;
}

/// Argon2id digests in PHC string format, salted per hash.
#[derive(Debug, Clone, Default)]
pub struct Argon2PasswordScheme;

impl PasswordScheme for Argon2PasswordScheme {
    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::PasswordHashError(e.to_string()))
    }

    fn verify_password(&self, password: &str, digest: &str) -> bool {
        // An undecodable digest verifies as a mismatch rather than an error;
        // callers cannot distinguish the two and must not need to.
        PasswordHash::new(digest)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}
