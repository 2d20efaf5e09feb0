//! JWT utilities for access token generation and validation
//!
//! Access tokens are HS256-signed and short-lived (5 minutes by default).
//! Validation accepts HS256 only, so a token whose header names any other
//! algorithm is rejected even if its signature would check out.
//! Refresh tokens are not JWTs; see the session manager.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::db::models::{Role, User};

/// Default access token expiration time (5 minutes)
const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 5;

/// Default refresh session lifetime (7 days)
const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 7;

const DEFAULT_ISSUER: &str = "stacklevest";

/// Accepted range for `JWT_ACCESS_EXPIRATION_MINUTES` (up to one day)
const ACCESS_EXPIRATION_RANGE_MINUTES: std::ops::RangeInclusive<i64> = 1..=1440;

/// Accepted range for `JWT_REFRESH_EXPIRATION_DAYS` (up to one year)
const REFRESH_EXPIRATION_RANGE_DAYS: std::ops::RangeInclusive<i64> = 1..=365;

/// The only algorithm tokens are signed and accepted with
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Refresh session expiration in days
    pub refresh_token_expiration_days: i64,
    /// Token issuer
    pub issuer: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field(
                "access_token_expiration_minutes",
                &self.access_token_expiration_minutes,
            )
            .field(
                "refresh_token_expiration_days",
                &self.refresh_token_expiration_days,
            )
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtConfig {
    /// Create a new JWT configuration
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            refresh_token_expiration_days: REFRESH_TOKEN_EXPIRATION_DAYS,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key/value source.
    ///
    /// Only the secret is required. A duration that is set but unparsable
    /// or outside its accepted range is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, JwtError> {
        let secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(JwtError::MissingSecret)?;

        let access_exp = parse_duration(
            &lookup,
            "JWT_ACCESS_EXPIRATION_MINUTES",
            ACCESS_TOKEN_EXPIRATION_MINUTES,
            ACCESS_EXPIRATION_RANGE_MINUTES,
        )?;

        let refresh_exp = parse_duration(
            &lookup,
            "JWT_REFRESH_EXPIRATION_DAYS",
            REFRESH_TOKEN_EXPIRATION_DAYS,
            REFRESH_EXPIRATION_RANGE_DAYS,
        )?;

        let issuer = lookup("JWT_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string());

        Ok(Self {
            secret,
            access_token_expiration_minutes: access_exp,
            refresh_token_expiration_days: refresh_exp,
            issuer,
        })
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Set refresh session expiration
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_token_expiration_days = days;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

fn parse_duration(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: i64,
    range: std::ops::RangeInclusive<i64>,
) -> Result<i64, JwtError> {
    let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };

    match value.trim().parse::<i64>() {
        Ok(parsed) if range.contains(&parsed) => Ok(parsed),
        _ => Err(JwtError::InvalidConfig { key, value }),
    }
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("Invalid value for {key}: {value:?}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token decoding failed: {0}")]
    DecodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidIssuer => JwtError::InvalidToken,
            _ => JwtError::DecodingError(err.to_string()),
        }
    }
}

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub id: String,
    /// User email
    pub email: String,
    /// User role
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

impl Claims {
    /// Whether the token's role is one of `allowed`
    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        allowed.contains(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Access token and refresh token handed to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token (short-lived JWT)
    pub access_token: String,
    /// Refresh token (opaque, long-lived)
    pub refresh_token: String,
    /// Access token expiration (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh session expiration (Unix timestamp)
    pub refresh_expires_at: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

/// JWT service for token operations
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Generate an access token for a verified user.
    ///
    /// Returns the token and its expiration as a Unix timestamp.
    pub fn generate_access_token(&self, user: &User) -> Result<(String, i64), JwtError> {
        let now = Utc::now();
        let exp = Duration::try_minutes(self.config.access_token_expiration_minutes)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| JwtError::EncodingError("access token lifetime out of range".into()))?;

        let claims = Claims {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok((token, exp.timestamp()))
    }

    /// Validate and decode an access token
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.set_issuer(&[&self.config.issuer]);
        // Set leeway to 0 for strict expiration checking
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        Ok(token_data.claims)
    }

    /// Refresh session lifetime in days
    pub fn refresh_token_expiration_days(&self) -> i64 {
        self.config.refresh_token_expiration_days
    }
}
