//! User repository
//!
//! Credential CRUD on top of the JSON store. Email lookups are
//! case-insensitive; IDs are assigned by the caller and must be unique.

use std::sync::Arc;

use crate::core::db::models::{PasswordHash, User};
use crate::core::db::store::{JsonStore, StoreError};

/// User repository error types
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("User not found")]
    NotFound,

    #[error("User ID already exists")]
    IdAlreadyExists,

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
}

/// User repository backed by the shared store
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<JsonStore>,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    /// All users in file order
    pub async fn find_all(&self) -> Result<Vec<User>, UserRepositoryError> {
        Ok(self.store.read(|data| data.users.clone()).await?)
    }

    /// Find a user by ID
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, UserRepositoryError> {
        let user = self
            .store
            .read(|data| data.users.iter().find(|u| u.id == id).cloned())
            .await?;
        Ok(user)
    }

    /// Find a user by email, ignoring case
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        let user = self
            .store
            .read(|data| data.users.iter().find(|u| u.email_matches(email)).cloned())
            .await?;
        Ok(user)
    }

    /// Append a user
    pub async fn create(&self, user: User) -> Result<User, UserRepositoryError> {
        let created = self
            .store
            .mutate(|data| {
                if data.users.iter().any(|u| u.id == user.id) {
                    return None;
                }
                data.users.push(user.clone());
                Some(user)
            })
            .await?;

        created.ok_or(UserRepositoryError::IdAlreadyExists)
    }

    /// Replace the user with the same ID
    pub async fn update(&self, user: User) -> Result<User, UserRepositoryError> {
        let updated = self
            .store
            .mutate(|data| {
                let slot = data.users.iter_mut().find(|u| u.id == user.id)?;
                *slot = user.clone();
                Some(user)
            })
            .await?;

        updated.ok_or(UserRepositoryError::NotFound)
    }

    /// Replace a legacy plaintext password with `upgraded`, but only while
    /// the stored value is still exactly `verified`.
    ///
    /// Returns `false` without writing when the user is gone or the password
    /// changed since it was checked.
    pub async fn upgrade_legacy_password(
        &self,
        id: &str,
        verified: &str,
        upgraded: PasswordHash,
    ) -> Result<bool, UserRepositoryError> {
        let swapped = self
            .store
            .mutate(|data| {
                let user = data.users.iter_mut().find(|u| u.id == id)?;
                match &user.password {
                    PasswordHash::Legacy(current) if current == verified => {
                        user.password = upgraded;
                        Some(())
                    }
                    _ => None,
                }
            })
            .await?;

        Ok(swapped.is_some())
    }

    /// Remove a user by ID
    pub async fn delete(&self, id: &str) -> Result<(), UserRepositoryError> {
        let deleted = self
            .store
            .mutate(|data| {
                let index = data.users.iter().position(|u| u.id == id)?;
                Some(data.users.remove(index))
            })
            .await?;

        deleted.map(|_| ()).ok_or(UserRepositoryError::NotFound)
    }
}
