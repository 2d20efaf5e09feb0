//! Refresh-token sessions
//!
//! A refresh token is a random 32-character alphanumeric string. Only its
//! bcrypt hash is stored, so a presented token can't be looked up by key:
//! resolving it means comparing against every stored hash in turn until one
//! matches. That costs one bcrypt verification per session on every refresh
//! and logout. Indexing on the raw token would mean storing it, which is
//! exactly what the hash is there to avoid.

use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;

use crate::core::db::models::{UserSession, generate_id, random_alphanumeric};
use crate::core::db::repositories::SessionRepository;
use crate::core::db::store::StoreError;

/// Length of the raw refresh token
pub const REFRESH_TOKEN_LENGTH: usize = 32;

/// Default session duration (7 days)
const DEFAULT_SESSION_DURATION_DAYS: i64 = 7;

const SESSION_ID_PREFIX: &str = "sess";

/// Session error types
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Refresh token hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session lookup task failed: {0}")]
    Lookup(#[from] tokio::task::JoinError),

    #[error("Session was already rotated")]
    AlreadyRotated,
}

/// A freshly created session together with the raw token for the client
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Raw refresh token. This is the only place it ever appears.
    pub refresh_token: String,
    pub session: UserSession,
}

/// Creates, resolves, rotates and destroys refresh-token sessions
#[derive(Clone)]
pub struct SessionManager {
    repo: SessionRepository,
    duration: Duration,
    hash_cost: u32,
}

impl SessionManager {
    /// Create a session manager with the default 7-day lifetime
    pub fn new(repo: SessionRepository, hash_cost: u32) -> Self {
        Self {
            repo,
            duration: Duration::days(DEFAULT_SESSION_DURATION_DAYS),
            hash_cost,
        }
    }

    /// Override the session lifetime
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    fn new_session(&self, user_id: &str) -> Result<IssuedSession, SessionError> {
        let refresh_token = random_alphanumeric(REFRESH_TOKEN_LENGTH);
        let token_hash = bcrypt::hash(&refresh_token, self.hash_cost)?;
        let now = Utc::now();

        Ok(IssuedSession {
            refresh_token,
            session: UserSession {
                id: generate_id(SESSION_ID_PREFIX),
                user_id: user_id.to_string(),
                refresh_token: token_hash,
                expires_at: now + self.duration,
                created_at: now,
            },
        })
    }

    /// Create and persist a new session for `user_id`
    pub async fn create_session(&self, user_id: &str) -> Result<IssuedSession, SessionError> {
        let issued = self.new_session(user_id)?;
        self.repo.create(issued.session.clone()).await?;

        tracing::debug!("Session {} created for user {}", issued.session.id, user_id);
        Ok(issued)
    }

    /// Find the stored session whose hash matches `raw_token`, expired or not.
    ///
    /// Scans a copy of all sessions sequentially on the blocking pool; the
    /// store lock is not held while hashing.
    async fn find_matching(&self, raw_token: &str) -> Result<Option<UserSession>, SessionError> {
        if raw_token.is_empty() {
            return Ok(None);
        }

        let sessions = self.repo.find_all().await?;
        let raw_token = raw_token.to_string();

        let found = tokio::task::spawn_blocking(move || {
            sessions
                .into_iter()
                .find(|s| bcrypt::verify(&raw_token, &s.refresh_token).unwrap_or(false))
        })
        .await?;

        Ok(found)
    }

    /// Resolve a raw refresh token to a live session.
    ///
    /// Unknown and expired tokens both yield `None`.
    pub async fn resolve_session(
        &self,
        raw_token: &str,
    ) -> Result<Option<UserSession>, SessionError> {
        Ok(self
            .find_matching(raw_token)
            .await?
            .filter(|session| !session.is_expired()))
    }

    /// Replace `old_session_id` with a new session for `user_id`.
    ///
    /// Delete and insert happen in one store write. If the old session is
    /// already gone (a concurrent rotation or logout won), nothing is
    /// created and `AlreadyRotated` is returned.
    pub async fn rotate(
        &self,
        old_session_id: &str,
        user_id: &str,
    ) -> Result<IssuedSession, SessionError> {
        let issued = self.new_session(user_id)?;

        if !self
            .repo
            .replace(old_session_id, issued.session.clone())
            .await?
        {
            return Err(SessionError::AlreadyRotated);
        }

        tracing::debug!(
            "Session {} rotated to {} for user {}",
            old_session_id,
            issued.session.id,
            user_id
        );
        Ok(issued)
    }

    /// Delete the session matching `raw_token`. Unknown tokens are a no-op.
    pub async fn destroy(&self, raw_token: &str) -> Result<(), SessionError> {
        if let Some(session) = self.find_matching(raw_token).await? {
            self.repo.delete(&session.id).await?;
            tracing::debug!("Session {} destroyed", session.id);
        }
        Ok(())
    }

    /// Delete every session belonging to `user_id`
    pub async fn destroy_all_for_user(&self, user_id: &str) -> Result<usize, SessionError> {
        Ok(self.repo.delete_all_for_user(user_id).await?)
    }

    /// Delete every expired session
    pub async fn purge_expired(&self) -> Result<usize, SessionError> {
        Ok(self.repo.cleanup_expired().await?)
    }

    /// Periodically purge expired sessions until the task is aborted
    pub fn spawn_reaper(self, every: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match self.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!("Purged {} expired sessions", n),
                    Err(e) => tracing::warn!("Expired session purge failed: {}", e),
                }
            }
        })
    }
}
