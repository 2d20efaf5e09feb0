//! Auth API endpoints
//!
//! Provides REST API endpoints for authentication:
//! - POST /api/login - Login and get tokens
//! - POST /api/auth/refresh - Rotate the refresh cookie and get a new access token
//! - POST /api/auth/logout - Logout (invalidate refresh token)
//! - GET /health - Liveness probe
//!
//! The refresh token travels in an HTTP-only `refreshToken` cookie. Login also
//! returns it in the body for clients that keep their own session.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use std::sync::Arc;

use crate::core::auth::{
    AuthError, AuthResponse, AuthService, LoginOutcome, LoginRequest, RefreshRequest,
};
use crate::core::db::models::UserResponse;

/// Name of the refresh token cookie
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
    /// Mark the refresh cookie `Secure` (HTTPS deployments)
    pub secure_cookies: bool,
}

impl AuthApiState {
    pub fn new(auth_service: AuthService) -> Self {
        Self {
            auth_service,
            secure_cookies: false,
        }
    }

    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    fn refresh_cookie(&self, token: String) -> Cookie<'static> {
        let max_age = self.auth_service.sessions().duration().num_seconds();

        Cookie::build((REFRESH_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(SameSite::Lax)
            .max_age(cookie::time::Duration::seconds(max_age))
            .build()
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AuthError::InternalError(e) => {
                tracing::error!("Auth request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        // Internal details stay in the log
        let message = match self {
            AuthError::InternalError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ApiError::new(message, code))).into_response()
    }
}

/// Body returned by login and refresh
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionApiResponse {
    pub user: UserResponse,
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl SessionApiResponse {
    fn with_refresh_token(resp: AuthResponse) -> Self {
        Self {
            user: resp.user,
            access_token: resp.tokens.access_token,
            refresh_token: Some(resp.tokens.refresh_token),
        }
    }

    fn without_refresh_token(resp: AuthResponse) -> Self {
        Self {
            user: resp.user,
            access_token: resp.tokens.access_token,
            refresh_token: None,
        }
    }
}

/// Body returned when the account still has to finish onboarding
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingResponse {
    pub requires_otp: bool,
}

/// Response for logout
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// POST /api/login
/// Login and get access/refresh tokens
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    tracing::debug!("Login attempt");

    match state.auth_service.login(request).await? {
        LoginOutcome::Authenticated(response) => {
            let jar = jar.add(state.refresh_cookie(response.tokens.refresh_token.clone()));
            Ok((jar, Json(SessionApiResponse::with_refresh_token(response))).into_response())
        }
        LoginOutcome::OnboardingRequired => {
            Ok(Json(OnboardingResponse { requires_otp: true }).into_response())
        }
    }
}

/// POST /api/auth/refresh
/// Rotate the refresh cookie and issue a new access token
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionApiResponse>), AuthError> {
    tracing::debug!("Token refresh request");

    let refresh_token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidToken)?;

    let response = state
        .auth_service
        .refresh(RefreshRequest { refresh_token })
        .await?;

    let jar = jar.add(state.refresh_cookie(response.tokens.refresh_token.clone()));

    Ok((jar, Json(SessionApiResponse::without_refresh_token(response))))
}

/// POST /api/auth/logout
/// Logout and invalidate refresh token
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
) -> (CookieJar, Json<LogoutResponse>) {
    tracing::info!("Logout request");

    if let Some(cookie) = jar.get(REFRESH_COOKIE) {
        state.auth_service.logout(cookie.value()).await;
    }

    let jar = jar.remove(Cookie::build(REFRESH_COOKIE).path("/"));

    (
        jar,
        Json(LogoutResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
}

/// GET /health
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "stacklevest-backend",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::JwtConfig;
    use crate::core::auth::jwt::JwtService;
    use crate::core::db::models::{PasswordHash, Role, User};
    use crate::core::db::repositories::UserRepository;
    use crate::core::db::store::JsonStore;
    use axum::body::Body;
    use axum::http::{Request, header};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const TEST_COST: u32 = 4;

    async fn create_test_app() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("db.json")));

        let users = UserRepository::new(Arc::clone(&store));
        users
            .create(User::new(
                "u1",
                "a@x.com",
                PasswordHash::Legacy("secret".into()),
                Role::Staff,
            ))
            .await
            .unwrap();
        let mut pending = User::new(
            "u2",
            "new@x.com",
            PasswordHash::Legacy("temp".into()),
            Role::Staff,
        );
        pending.needs_onboarding = true;
        users.create(pending).await.unwrap();

        let jwt = JwtService::new(JwtConfig::new("test_secret_key_for_testing_only_32bytes!"));
        let service = AuthService::from_store(store, jwt, TEST_COST);

        (dir, auth_api_router(AuthApiState::new(service)))
    }

    fn login_request(email: &str, password: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/login")
            .header("Content-Type", "application/json")
            .body(Body::from(
                serde_json::json!({ "email": email, "password": password }).to_string(),
            ))
            .unwrap()
    }

    fn with_cookie(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::COOKIE, format!("{}={}", REFRESH_COOKIE, token))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookie(response: &Response) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .expect("Set-Cookie header")
            .to_str()
            .unwrap()
            .to_string()
    }

    // ========================================================================
    // Login
    // ========================================================================

    #[tokio::test]
    async fn test_login_sets_http_only_cookie() {
        let (_dir, app) = create_test_app().await;

        let response = app.oneshot(login_request("a@x.com", "secret")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = set_cookie(&response);
        assert!(cookie.starts_with("refreshToken="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=604800"));

        let body = body_json(response).await;
        assert_eq!(body["user"]["id"], "u1");
        assert!(body["user"].get("password").is_none());
        assert!(body["accessToken"].is_string());
        let token = body["refreshToken"].as_str().unwrap();
        assert!(cookie.contains(token));
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let (_dir, app) = create_test_app().await;

        let response = app.oneshot(login_request("a@x.com", "wrong")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(response).await;
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
    }

    #[tokio::test]
    async fn test_login_unknown_user_same_response() {
        let (_dir, app) = create_test_app().await;

        let response = app
            .oneshot(login_request("nobody@x.com", "secret"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
        assert_eq!(body["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_login_onboarding_required() {
        let (_dir, app) = create_test_app().await;

        let response = app.oneshot(login_request("new@x.com", "temp")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({ "requiresOtp": true }));
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    #[derive(Clone, Default)]
    struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_login_logs_never_contain_email() {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (_dir, app) = create_test_app().await;
        for (email, password) in [
            ("a@x.com", "secret"),
            ("a@x.com", "wrong"),
            ("nobody@x.com", "secret"),
            ("new@x.com", "temp"),
        ] {
            app.clone().oneshot(login_request(email, password)).await.unwrap();
        }

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Login attempt"));
        for email in ["a@x.com", "nobody@x.com", "new@x.com"] {
            assert!(!logs.contains(email), "log leaked {}", email);
        }
    }

    #[tokio::test]
    async fn test_refresh_without_cookie() {
        let (_dir, app) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/refresh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_rotates_cookie() {
        let (_dir, app) = create_test_app().await;

        let login = app
            .clone()
            .oneshot(login_request("a@x.com", "secret"))
            .await
            .unwrap();
        let token = body_json(login).await["refreshToken"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(with_cookie("/api/auth/refresh", &token))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = set_cookie(&response);
        assert!(cookie.starts_with("refreshToken="));
        assert!(!cookie.contains(&token));

        let body = body_json(response).await;
        assert_eq!(body["user"]["email"], "a@x.com");
        assert!(body["accessToken"].is_string());
        assert!(body.get("refreshToken").is_none());

        // The rotated-out token is dead
        let reuse = app
            .oneshot(with_cookie("/api/auth/refresh", &token))
            .await
            .unwrap();
        assert_eq!(reuse.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(reuse).await["code"], "INVALID_TOKEN");
    }

    // ========================================================================
    // Logout
    // ========================================================================

    #[tokio::test]
    async fn test_logout_clears_cookie_and_session() {
        let (_dir, app) = create_test_app().await;

        let login = app
            .clone()
            .oneshot(login_request("a@x.com", "secret"))
            .await
            .unwrap();
        let token = body_json(login).await["refreshToken"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(with_cookie("/api/auth/logout", &token))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = set_cookie(&response);
        assert!(cookie.starts_with("refreshToken=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert_eq!(
            body_json(response).await["message"],
            "Logged out successfully"
        );

        let refresh = app
            .oneshot(with_cookie("/api/auth/refresh", &token))
            .await
            .unwrap();
        assert_eq!(refresh.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_without_cookie_is_ok() {
        let (_dir, app) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/logout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, app) = create_test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    // ========================================================================
    // Error Mapping Tests
    // ========================================================================

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let response =
            AuthError::InternalError("disk on fire at /var/db.json".into()).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(!body["error"].as_str().unwrap().contains("/var/db.json"));
    }

    #[test]
    fn test_api_error_serialization() {
        let error = ApiError::new("Something went wrong", "ERROR_CODE");
        let json = serde_json::to_string(&error).unwrap();

        assert!(json.contains("Something went wrong"));
        assert!(json.contains("ERROR_CODE"));
    }

    #[test]
    fn test_secure_cookie_flag() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonStore::new(dir.path().join("db.json")));
        let jwt = JwtService::new(JwtConfig::new("test_secret_key_for_testing_only_32bytes!"));
        let state = AuthApiState::new(AuthService::from_store(store, jwt, TEST_COST))
            .with_secure_cookies(true);

        let cookie = state.refresh_cookie("abc".to_string());
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
