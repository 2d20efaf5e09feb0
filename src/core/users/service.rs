//! User service
//!
//! Passes credential CRUD through to the store. Passwords supplied here are
//! hashed before they are written; a password change or a delete also ends
//! every session the user holds.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Map;

use crate::core::auth::password::{HashingError, PasswordVerifier};
use crate::core::auth::session::{SessionError, SessionManager};
use crate::core::db::models::{Role, User, UserResponse};
use crate::core::db::repositories::{SessionRepository, UserRepository, UserRepositoryError};
use crate::core::db::store::JsonStore;

/// User service error types
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("User not found")]
    NotFound,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("User ID already exists")]
    IdAlreadyExists,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UserRepositoryError> for UserServiceError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::NotFound => UserServiceError::NotFound,
            UserRepositoryError::IdAlreadyExists => UserServiceError::IdAlreadyExists,
            UserRepositoryError::StoreError(e) => UserServiceError::Internal(e.to_string()),
        }
    }
}

impl From<SessionError> for UserServiceError {
    fn from(err: SessionError) -> Self {
        UserServiceError::Internal(err.to_string())
    }
}

impl From<HashingError> for UserServiceError {
    fn from(err: HashingError) -> Self {
        UserServiceError::Internal(err.to_string())
    }
}

/// New credential record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub needs_onboarding: bool,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub reporting_manager: String,
    #[serde(default)]
    pub staff_number: String,
}

/// Partial update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub needs_onboarding: Option<bool>,
    pub department: Option<String>,
    pub job_title: Option<String>,
    pub reporting_manager: Option<String>,
    pub staff_number: Option<String>,
    pub status: Option<String>,
    pub avatar: Option<String>,
}

/// Credential CRUD service
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    sessions: SessionManager,
    verifier: PasswordVerifier,
}

impl UserService {
    pub fn new(
        user_repo: UserRepository,
        sessions: SessionManager,
        verifier: PasswordVerifier,
    ) -> Self {
        Self {
            user_repo,
            sessions,
            verifier,
        }
    }

    /// Wire the service over a shared store
    pub fn from_store(store: Arc<JsonStore>, hash_cost: u32) -> Self {
        Self::new(
            UserRepository::new(Arc::clone(&store)),
            SessionManager::new(SessionRepository::new(store), hash_cost),
            PasswordVerifier::new(hash_cost),
        )
    }

    pub async fn get_all(&self) -> Result<Vec<UserResponse>, UserServiceError> {
        let users = self.user_repo.find_all().await?;
        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<UserResponse>, UserServiceError> {
        Ok(self.user_repo.find_by_id(id).await?.map(UserResponse::from))
    }

    pub async fn get_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserResponse>, UserServiceError> {
        Ok(self
            .user_repo
            .find_by_email(email)
            .await?
            .map(UserResponse::from))
    }

    /// Create a credential record with a hashed password
    pub async fn create(
        &self,
        request: CreateUserRequest,
    ) -> Result<UserResponse, UserServiceError> {
        let email = normalize_email(&request.email)?;
        if request.password.is_empty() {
            return Err(UserServiceError::InvalidInput("password is required".into()));
        }

        // Not atomic with the insert below; concurrent creates can still race
        if self.user_repo.find_by_email(&email).await?.is_some() {
            return Err(UserServiceError::EmailAlreadyExists);
        }

        let id = request
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let user = User {
            id,
            name: request.name,
            email,
            password: self.verifier.hash(&request.password)?,
            needs_onboarding: request.needs_onboarding,
            role: request.role,
            department: request.department,
            job_title: request.job_title,
            reporting_manager: request.reporting_manager,
            staff_number: request.staff_number,
            status: String::new(),
            avatar: String::new(),
            created_at: Some(Utc::now()),
            extra: Map::new(),
        };

        let created = self.user_repo.create(user).await?;
        tracing::info!("Created user {} ({})", created.id, created.role);

        Ok(created.into())
    }

    /// Apply a partial update
    pub async fn update(
        &self,
        id: &str,
        request: UpdateUserRequest,
    ) -> Result<UserResponse, UserServiceError> {
        let mut user = self
            .user_repo
            .find_by_id(id)
            .await?
            .ok_or(UserServiceError::NotFound)?;

        if let Some(email) = request.email {
            let email = normalize_email(&email)?;
            if let Some(other) = self.user_repo.find_by_email(&email).await? {
                if other.id != user.id {
                    return Err(UserServiceError::EmailAlreadyExists);
                }
            }
            user.email = email;
        }

        let password_changed = match request.password {
            Some(password) if password.is_empty() => {
                return Err(UserServiceError::InvalidInput("password must not be empty".into()));
            }
            Some(password) => {
                user.password = self.verifier.hash(&password)?;
                true
            }
            None => false,
        };

        if let Some(name) = request.name {
            user.name = name;
        }
        if let Some(role) = request.role {
            user.role = role;
        }
        if let Some(needs_onboarding) = request.needs_onboarding {
            user.needs_onboarding = needs_onboarding;
        }
        if let Some(department) = request.department {
            user.department = department;
        }
        if let Some(job_title) = request.job_title {
            user.job_title = job_title;
        }
        if let Some(reporting_manager) = request.reporting_manager {
            user.reporting_manager = reporting_manager;
        }
        if let Some(staff_number) = request.staff_number {
            user.staff_number = staff_number;
        }
        if let Some(status) = request.status {
            user.status = status;
        }
        if let Some(avatar) = request.avatar {
            user.avatar = avatar;
        }

        let updated = self.user_repo.update(user).await?;

        if password_changed {
            let ended = self.sessions.destroy_all_for_user(&updated.id).await?;
            tracing::info!(
                "Password changed for user {}, ended {} sessions",
                updated.id,
                ended
            );
        }

        Ok(updated.into())
    }

    /// Delete a user and every session they hold
    pub async fn delete(&self, id: &str) -> Result<(), UserServiceError> {
        self.user_repo.delete(id).await?;
        let ended = self.sessions.destroy_all_for_user(id).await?;
        tracing::info!("Deleted user {}, ended {} sessions", id, ended);
        Ok(())
    }

    /// Log a user out everywhere
    pub async fn delete_user_sessions(&self, id: &str) -> Result<usize, UserServiceError> {
        Ok(self.sessions.destroy_all_for_user(id).await?)
    }
}

fn normalize_email(email: &str) -> Result<String, UserServiceError> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(UserServiceError::InvalidInput(format!(
            "invalid email: {:?}",
            email
        )));
    }
    Ok(email.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::password::Verification;
    use crate::core::db::models::PasswordHash;
    use tempfile::TempDir;

    const TEST_COST: u32 = 4;

    struct Fixture {
        _dir: TempDir,
        store: Arc<JsonStore>,
        service: UserService,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("db.json")));
        let service = UserService::from_store(Arc::clone(&store), TEST_COST);
        Fixture {
            _dir: dir,
            store,
            service,
        }
    }

    fn create_request(email: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            id: None,
            name: "Test User".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role: Role::Staff,
            needs_onboarding: false,
            department: String::new(),
            job_title: String::new(),
            reporting_manager: String::new(),
            staff_number: String::new(),
        }
    }

    async fn stored(fx: &Fixture, id: &str) -> User {
        UserRepository::new(Arc::clone(&fx.store))
            .find_by_id(id)
            .await
            .unwrap()
            .unwrap()
    }

    // ========================================================================
    // Create
    // ========================================================================

    #[tokio::test]
    async fn test_create_hashes_password() {
        let fx = fixture();

        let created = fx
            .service
            .create(create_request("a@x.com", "secret"))
            .await
            .unwrap();

        assert!(!created.id.is_empty());
        let user = stored(&fx, &created.id).await;
        assert!(user.password.is_hashed());
        assert_eq!(
            PasswordVerifier::new(TEST_COST).verify("secret", &user.password),
            Verification::Matched
        );

        let json = serde_json::to_string(&created).unwrap();
        assert!(!json.contains("password"));
    }

    #[tokio::test]
    async fn test_create_keeps_caller_id() {
        let fx = fixture();
        let mut request = create_request("a@x.com", "secret");
        request.id = Some("staff-001".to_string());

        let created = fx.service.create(request).await.unwrap();
        assert_eq!(created.id, "staff-001");
    }

    #[tokio::test]
    async fn test_create_duplicate_email_case_insensitive() {
        let fx = fixture();
        fx.service
            .create(create_request("a@x.com", "secret"))
            .await
            .unwrap();

        let result = fx.service.create(create_request("A@X.COM", "other")).await;
        assert!(matches!(result, Err(UserServiceError::EmailAlreadyExists)));
    }

    #[tokio::test]
    async fn test_create_duplicate_id() {
        let fx = fixture();
        let mut first = create_request("a@x.com", "secret");
        first.id = Some("u1".to_string());
        fx.service.create(first).await.unwrap();

        let mut second = create_request("b@x.com", "secret");
        second.id = Some("u1".to_string());
        let result = fx.service.create(second).await;
        assert!(matches!(result, Err(UserServiceError::IdAlreadyExists)));
    }

    #[tokio::test]
    async fn test_create_invalid_input() {
        let fx = fixture();

        let result = fx.service.create(create_request("not-an-email", "secret")).await;
        assert!(matches!(result, Err(UserServiceError::InvalidInput(_))));

        let result = fx.service.create(create_request("a@x.com", "")).await;
        assert!(matches!(result, Err(UserServiceError::InvalidInput(_))));
    }

    // ========================================================================
    // Read
    // ========================================================================

    #[tokio::test]
    async fn test_get_all_and_lookups() {
        let fx = fixture();
        let a = fx
            .service
            .create(create_request("a@x.com", "secret"))
            .await
            .unwrap();
        fx.service
            .create(create_request("b@x.com", "secret"))
            .await
            .unwrap();

        assert_eq!(fx.service.get_all().await.unwrap().len(), 2);
        assert_eq!(
            fx.service.get_by_id(&a.id).await.unwrap().unwrap().email,
            "a@x.com"
        );
        assert_eq!(
            fx.service.get_by_email("A@x.com").await.unwrap().unwrap().id,
            a.id
        );
        assert!(fx.service.get_by_id("missing").await.unwrap().is_none());
        assert!(fx.service.get_by_email("c@x.com").await.unwrap().is_none());
    }

    // ========================================================================
    // Update
    // ========================================================================

    #[tokio::test]
    async fn test_update_profile_fields() {
        let fx = fixture();
        let created = fx
            .service
            .create(create_request("a@x.com", "secret"))
            .await
            .unwrap();
        let before = stored(&fx, &created.id).await.password;

        let updated = fx
            .service
            .update(
                &created.id,
                UpdateUserRequest {
                    name: Some("Renamed".to_string()),
                    role: Some(Role::Manager),
                    job_title: Some("Lead".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.role, Role::Manager);
        assert_eq!(updated.job_title, "Lead");
        assert_eq!(updated.email, "a@x.com");
        assert_eq!(stored(&fx, &created.id).await.password, before);
    }

    #[tokio::test]
    async fn test_update_password_ends_sessions() {
        let fx = fixture();
        let created = fx
            .service
            .create(create_request("a@x.com", "secret"))
            .await
            .unwrap();
        fx.service
            .sessions
            .create_session(&created.id)
            .await
            .unwrap();

        fx.service
            .update(
                &created.id,
                UpdateUserRequest {
                    password: Some("new-secret".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let user = stored(&fx, &created.id).await;
        let verifier = PasswordVerifier::new(TEST_COST);
        assert_eq!(verifier.verify("new-secret", &user.password), Verification::Matched);
        assert_eq!(verifier.verify("secret", &user.password), Verification::Mismatch);
        assert!(fx.store.load().await.unwrap().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_update_email_conflict() {
        let fx = fixture();
        let a = fx
            .service
            .create(create_request("a@x.com", "secret"))
            .await
            .unwrap();
        fx.service
            .create(create_request("b@x.com", "secret"))
            .await
            .unwrap();

        let result = fx
            .service
            .update(
                &a.id,
                UpdateUserRequest {
                    email: Some("B@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(UserServiceError::EmailAlreadyExists)));

        // Re-saving your own email is fine
        fx.service
            .update(
                &a.id,
                UpdateUserRequest {
                    email: Some("A@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let fx = fixture();
        let result = fx.service.update("missing", UpdateUserRequest::default()).await;
        assert!(matches!(result, Err(UserServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_preserves_unknown_keys() {
        let fx = fixture();
        let mut user = User::new("u1", "a@x.com", PasswordHash::Legacy("pw".into()), Role::Staff);
        user.extra
            .insert("slackHandle".to_string(), serde_json::json!("@alice"));
        UserRepository::new(Arc::clone(&fx.store))
            .create(user)
            .await
            .unwrap();

        fx.service
            .update(
                "u1",
                UpdateUserRequest {
                    status: Some("away".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let user = stored(&fx, "u1").await;
        assert_eq!(user.status, "away");
        assert_eq!(user.extra["slackHandle"], "@alice");
    }

    // ========================================================================
    // Delete
    // ========================================================================

    #[tokio::test]
    async fn test_delete_removes_user_and_sessions() {
        let fx = fixture();
        let a = fx
            .service
            .create(create_request("a@x.com", "secret"))
            .await
            .unwrap();
        let b = fx
            .service
            .create(create_request("b@x.com", "secret"))
            .await
            .unwrap();
        fx.service.sessions.create_session(&a.id).await.unwrap();
        fx.service.sessions.create_session(&b.id).await.unwrap();

        fx.service.delete(&a.id).await.unwrap();

        assert!(fx.service.get_by_id(&a.id).await.unwrap().is_none());
        let sessions = fx.store.load().await.unwrap().sessions.clone();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user_id, b.id);

        let result = fx.service.delete(&a.id).await;
        assert!(matches!(result, Err(UserServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_user_sessions() {
        let fx = fixture();
        let a = fx
            .service
            .create(create_request("a@x.com", "secret"))
            .await
            .unwrap();
        fx.service.sessions.create_session(&a.id).await.unwrap();
        fx.service.sessions.create_session(&a.id).await.unwrap();

        assert_eq!(fx.service.delete_user_sessions(&a.id).await.unwrap(), 2);
        assert_eq!(fx.service.delete_user_sessions(&a.id).await.unwrap(), 0);
        assert!(fx.service.get_by_id(&a.id).await.unwrap().is_some());
    }
}
