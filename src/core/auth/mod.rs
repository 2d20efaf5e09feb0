//! Authentication module for StackleVest
//!
//! This module provides authentication functionality including:
//! - Password verification with legacy plaintext upgrade
//! - JWT access token generation and validation
//! - Refresh-token sessions with rotation
//! - REST API endpoints for login, refresh and logout

pub mod api;
pub mod jwt;
pub mod password;
pub mod service;
pub mod session;

pub use api::{AuthApiState, auth_api_router};
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, TokenPair};
pub use password::{PasswordVerifier, Verification};
pub use service::{
    AuthError, AuthResponse, AuthService, LoginOutcome, LoginRequest, RefreshRequest,
};
pub use session::{IssuedSession, SessionError, SessionManager};
