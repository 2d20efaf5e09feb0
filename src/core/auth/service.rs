//! Authentication service
//!
//! Provides the login, refresh and logout workflows.
//! Coordinates between the user repository, password verifier, session
//! manager and JWT service.
//!
//! Every lookup or verification failure leaves this module as one of two
//! generic errors, `InvalidCredentials` or `InvalidToken`, whatever the
//! underlying cause.

use std::sync::Arc;

use crate::core::auth::jwt::{Claims, JwtError, JwtService, TokenPair};
use crate::core::auth::password::{PasswordVerifier, Verification};
use crate::core::auth::session::{IssuedSession, SessionError, SessionManager};
use crate::core::db::models::{User, UserResponse};
use crate::core::db::repositories::{SessionRepository, UserRepository, UserRepositoryError};
use crate::core::db::store::{JsonStore, StoreError};

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<UserRepositoryError> for AuthError {
    fn from(err: UserRepositoryError) -> Self {
        AuthError::InternalError(err.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::InternalError(err.to_string())
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadyRotated => AuthError::InvalidToken,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired | JwtError::InvalidToken | JwtError::DecodingError(_) => {
                AuthError::InvalidToken
            }
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

/// Login request data
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Authentication response with sanitized user data and tokens
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

/// Result of a successful password check
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Tokens issued and a session created
    Authenticated(AuthResponse),
    /// Password was correct but the account must finish onboarding first.
    /// No tokens were issued.
    OnboardingRequired,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    sessions: SessionManager,
    jwt_service: JwtService,
    verifier: PasswordVerifier,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        user_repo: UserRepository,
        sessions: SessionManager,
        jwt_service: JwtService,
        verifier: PasswordVerifier,
    ) -> Self {
        Self {
            user_repo,
            sessions,
            jwt_service,
            verifier,
        }
    }

    /// Wire the service over a shared store.
    ///
    /// Session lifetime follows the JWT config; both passwords and refresh
    /// tokens are hashed with `hash_cost`.
    pub fn from_store(store: Arc<JsonStore>, jwt_service: JwtService, hash_cost: u32) -> Self {
        let sessions = SessionManager::new(SessionRepository::new(Arc::clone(&store)), hash_cost)
            .with_duration(chrono::Duration::days(
                jwt_service.refresh_token_expiration_days(),
            ));

        Self::new(
            UserRepository::new(store),
            sessions,
            jwt_service,
            PasswordVerifier::new(hash_cost),
        )
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Sign the access token for `user`.
    ///
    /// Called before any session is written so a signing failure leaves the
    /// store untouched.
    fn sign_access(&self, user: &User) -> Result<(String, i64), AuthError> {
        Ok(self.jwt_service.generate_access_token(user)?)
    }

    /// Login an existing user
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, AuthError> {
        let email = request.email.trim();
        if email.is_empty() || request.password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let Some(user) = self.user_repo.find_by_email(email).await? else {
            tracing::info!("Login failed: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        match self.verifier.verify(&request.password, &user.password) {
            Verification::Mismatch => {
                tracing::info!("Login failed: wrong password for user {}", user.id);
                return Err(AuthError::InvalidCredentials);
            }
            Verification::Matched => {}
            Verification::NeedsUpgrade(hashed) => {
                // Best effort: the user is authenticated either way
                match self
                    .user_repo
                    .upgrade_legacy_password(&user.id, &request.password, hashed)
                    .await
                {
                    Ok(true) => tracing::info!("Upgraded legacy password for user {}", user.id),
                    Ok(false) => tracing::info!(
                        "Skipped password upgrade for user {}: changed concurrently",
                        user.id
                    ),
                    Err(e) => tracing::warn!(
                        "Failed to persist password upgrade for user {}: {}",
                        user.id,
                        e
                    ),
                }
            }
        }

        if user.needs_onboarding {
            tracing::info!("User {} must complete onboarding", user.id);
            return Ok(LoginOutcome::OnboardingRequired);
        }

        let access = self.sign_access(&user)?;
        let issued = self.sessions.create_session(&user.id).await?;
        let tokens = token_pair(access, issued);

        tracing::info!("User {} logged in", user.id);

        Ok(LoginOutcome::Authenticated(AuthResponse {
            user: user.into(),
            tokens,
        }))
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// The presented token is single-use: its session is replaced by a new
    /// one and it will not resolve again.
    pub async fn refresh(&self, request: RefreshRequest) -> Result<AuthResponse, AuthError> {
        let session = self
            .sessions
            .resolve_session(&request.refresh_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let Some(user) = self.user_repo.find_by_id(&session.user_id).await? else {
            tracing::warn!(
                "Session {} belongs to missing user {}",
                session.id,
                session.user_id
            );
            return Err(AuthError::InvalidToken);
        };

        let access = self.sign_access(&user)?;
        let issued = self.sessions.rotate(&session.id, &user.id).await?;
        let tokens = token_pair(access, issued);

        tracing::debug!("Session refreshed for user {}", user.id);

        Ok(AuthResponse {
            user: user.into(),
            tokens,
        })
    }

    /// Logout (invalidate refresh token). Never fails toward the caller.
    pub async fn logout(&self, refresh_token: &str) {
        if let Err(e) = self.sessions.destroy(refresh_token).await {
            tracing::warn!("Logout could not remove session: {}", e);
        }
    }

    /// Logout from all devices (invalidate all refresh tokens for user)
    pub async fn logout_all(&self, user_id: &str) -> Result<usize, AuthError> {
        let count = self.sessions.destroy_all_for_user(user_id).await?;
        tracing::info!("Removed {} sessions for user {}", count, user_id);
        Ok(count)
    }

    /// Validate an access token and return its claims
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(self.jwt_service.validate_access_token(token)?)
    }
}

fn token_pair((access_token, access_expires_at): (String, i64), issued: IssuedSession) -> TokenPair {
    TokenPair {
        access_token,
        refresh_token: issued.refresh_token,
        access_expires_at,
        refresh_expires_at: issued.session.expires_at.timestamp(),
        token_type: "Bearer".to_string(),
    }
}
