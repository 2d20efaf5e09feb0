//! Password verification with legacy upgrade
//!
//! Stored passwords are either bcrypt hashes or, for records that predate
//! hashing, plaintext. A plaintext match is still accepted once and comes
//! back with a fresh hash for the caller to persist.

use crate::core::db::models::PasswordHash;

/// Outcome of checking a presented password
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Matched a bcrypt hash
    Matched,
    /// Matched legacy plaintext; carries the hash that should replace it
    NeedsUpgrade(PasswordHash),
    Mismatch,
}

impl Verification {
    pub fn is_match(&self) -> bool {
        !matches!(self, Verification::Mismatch)
    }
}

/// Password hashing error
#[derive(Debug, thiserror::Error)]
#[error("Password hashing failed: {0}")]
pub struct HashingError(#[from] pub bcrypt::BcryptError);

/// bcrypt-based verifier
#[derive(Debug, Clone, Copy)]
pub struct PasswordVerifier {
    cost: u32,
}

impl Default for PasswordVerifier {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordVerifier {
    /// Create a verifier that hashes with the given bcrypt cost
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password using bcrypt with automatic salt generation
    pub fn hash(&self, password: &str) -> Result<PasswordHash, HashingError> {
        Ok(PasswordHash::Hashed(bcrypt::hash(password, self.cost)?))
    }

    /// Check `presented` against the stored value.
    ///
    /// Never fails: an unreadable hash is a mismatch, and a failed upgrade
    /// hash still lets the legacy match through.
    pub fn verify(&self, presented: &str, stored: &PasswordHash) -> Verification {
        match stored {
            PasswordHash::Hashed(hash) => match bcrypt::verify(presented, hash) {
                Ok(true) => Verification::Matched,
                Ok(false) => Verification::Mismatch,
                Err(e) => {
                    tracing::warn!("Stored password hash could not be parsed: {}", e);
                    Verification::Mismatch
                }
            },
            PasswordHash::Legacy(plain) => {
                if plain.is_empty() || plain.as_bytes() != presented.as_bytes() {
                    return Verification::Mismatch;
                }
                match self.hash(presented) {
                    Ok(upgraded) => Verification::NeedsUpgrade(upgraded),
                    Err(e) => {
                        tracing::warn!("Could not hash legacy password for upgrade: {}", e);
                        Verification::Matched
                    }
                }
            }
        }
    }
}
