//! Password hashing (argon2id, salted, one-way).

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordVerifier, SaltString},
    Argon2, Params,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("failed to hash password")]
    Hash,
}

/// Adaptive salted hasher with a configurable memory cost.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { argon2: Argon2::default() }
    }
}

impl PasswordHasher {
    /// Build a hasher with an explicit memory cost (KiB). Other parameters
    /// stay at the argon2id defaults.
    pub fn with_memory_cost(m_cost_kib: u32) -> Result<Self, PasswordError> {
        let params = Params::new(
            m_cost_kib,
            Params::DEFAULT_T_COST,
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|_| PasswordError::Hash)?;

        Ok(Self {
            argon2: Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
        })
    }

    /// Hash a plaintext password into a PHC string (random salt per call).
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = argon2::PasswordHasher::hash_password(&self.argon2, password.as_bytes(), &salt)
            .map_err(|_| PasswordError::Hash)?;
        Ok(hash.to_string())
    }

    /// Verify a plaintext password against a stored PHC hash.
    ///
    /// Malformed stored hashes verify as false rather than erroring: from the
    /// caller's perspective that account simply has no valid credential.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Burn the same work as a real verification against a throwaway hash.
    ///
    /// Called when the user lookup itself fails, so a missing account costs
    /// the same wall time as a wrong password and does not leak existence.
    pub fn verify_dummy(&self, password: &str) {
        // Any well-formed argon2id PHC string works; the result is discarded.
        const DUMMY: &str = "$argon2id$v=19$m=19456,t=2,p=1$gZiV/M1gPc22ElAH/Jh1Hw$CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno";
        let _ = self.verify(password, DUMMY);
    }
}
