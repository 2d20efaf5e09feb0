//! Session repository for refresh token management
//!
//! Stores session records whose `refresh_token` field holds a bcrypt hash.
//! Hashing and matching live in the session manager; this layer only moves
//! records in and out of the store.

use std::sync::Arc;

use chrono::Utc;

use crate::core::db::models::UserSession;
use crate::core::db::store::{JsonStore, StoreError};

/// Session repository backed by the shared store
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<JsonStore>,
}

impl SessionRepository {
    /// Create a new session repository
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    /// Persist a new session
    pub async fn create(&self, session: UserSession) -> Result<UserSession, StoreError> {
        self.store
            .mutate(|data| {
                data.sessions.push(session.clone());
                Some(())
            })
            .await?;

        Ok(session)
    }

    /// Copy of every session record
    pub async fn find_all(&self) -> Result<Vec<UserSession>, StoreError> {
        self.store.read(|data| data.sessions.clone()).await
    }

    /// Find a session by ID
    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserSession>, StoreError> {
        self.store
            .read(|data| data.sessions.iter().find(|s| s.id == id).cloned())
            .await
    }

    /// Sessions owned by a user
    pub async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<UserSession>, StoreError> {
        self.store
            .read(|data| {
                data.sessions
                    .iter()
                    .filter(|s| s.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Delete a session by ID. Returns false if it was already gone.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self
            .store
            .mutate(|data| {
                let index = data.sessions.iter().position(|s| s.id == id)?;
                Some(data.sessions.remove(index))
            })
            .await?;

        Ok(deleted.is_some())
    }

    /// Swap `old_id` for `replacement` in a single write.
    ///
    /// Returns false, and inserts nothing, if `old_id` no longer exists.
    pub async fn replace(
        &self,
        old_id: &str,
        replacement: UserSession,
    ) -> Result<bool, StoreError> {
        let replaced = self
            .store
            .mutate(|data| {
                let index = data.sessions.iter().position(|s| s.id == old_id)?;
                data.sessions.remove(index);
                data.sessions.push(replacement);
                Some(())
            })
            .await?;

        Ok(replaced.is_some())
    }

    /// Delete all sessions for a user (logout from all devices)
    pub async fn delete_all_for_user(&self, user_id: &str) -> Result<usize, StoreError> {
        let removed = self
            .store
            .mutate(|data| {
                let before = data.sessions.len();
                data.sessions.retain(|s| s.user_id != user_id);
                let removed = before - data.sessions.len();
                (removed > 0).then_some(removed)
            })
            .await?;

        Ok(removed.unwrap_or(0))
    }

    /// Drop every session whose expiry has passed
    pub async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let removed = self
            .store
            .mutate(|data| {
                let before = data.sessions.len();
                data.sessions.retain(|s| s.expires_at > now);
                let removed = before - data.sessions.len();
                (removed > 0).then_some(removed)
            })
            .await?;

        Ok(removed.unwrap_or(0))
    }
}
