//! Password hashing and credential verification.
//!
//! Hashes are Argon2id PHC strings with m=19 MiB, t=2, p=1 and a random
//! salt per hash. Verification reads the parameters back from the stored
//! string, so older hashes keep working if the defaults change.

use std::sync::OnceLock;

use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use tracing::{debug, warn};

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::user_store::UserStore;
use crate::db::schema::UserRecord;

/// Hash a plaintext password with Argon2id.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let params = Params::new(19_456, 2, 1, None)
        .map_err(|e| anyhow!("argon2 params error: {}", e))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hash error: {}", e))?;

    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash.
///
/// `Ok(false)` on mismatch, `Err` only when the stored hash is unusable.
pub fn verify_password(
    password: &str,
    hash: &str,
) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Hash checked when the email is unknown, so that path costs the same as a
/// wrong password.
fn dummy_hash() -> &'static str {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();
    DUMMY_HASH.get_or_init(|| hash_password("session-gate-dummy").unwrap_or_default())
}

/// Checks an email/password pair against the stored salted hash.
#[derive(Clone)]
pub struct CredentialVerifier {
    users: UserStore,
}

impl CredentialVerifier {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    /// Get reference to the user store.
    pub fn users(&self) -> &UserStore {
        &self.users
    }

    /// Return the active user owning `email` if `password` matches.
    ///
    /// Unknown email, inactive user and wrong password all yield
    /// `InvalidCredentials`, and all of them run one Argon2 verification.
    pub async fn verify(&self, email: &str, password: &str) -> AuthResult<UserRecord> {
        let user = self
            .users
            .find_active_by_email(email)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        let password = password.to_owned();
        let hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => dummy_hash().to_owned(),
        };

        // Argon2 is CPU-bound; keep it off the async workers.
        let outcome = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::Storage(format!("password check aborted: {}", e)))?;

        match (user, outcome) {
            (Some(user), Ok(true)) => Ok(user),
            (Some(user), Err(e)) => {
                warn!(user_id = %user.id, error = %e, "Stored password hash is unusable");
                Err(AuthError::InvalidCredentials)
            }
            (Some(_), Ok(false)) | (None, _) => {
                debug!("Credential check failed");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}
