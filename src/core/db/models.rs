//! Persisted models for StackleVest
//!
//! This module defines the records stored in the JSON document backing the
//! store. Field names are camelCase on disk so the file stays compatible with
//! the websocket server that shares it.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Length of a bcrypt hash in its modular crypt format
const BCRYPT_HASH_LEN: usize = 60;

/// Prefixes bcrypt uses for its supported revisions
const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

/// Generate a random string from `[A-Za-z0-9]` using the thread-local CSPRNG
pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a record ID of the form `<prefix>_<yyyymmddHHMMSS>_<6 random chars>`
pub fn generate_id(prefix: &str) -> String {
    format!(
        "{}_{}_{}",
        prefix,
        Utc::now().format("%Y%m%d%H%M%S"),
        random_alphanumeric(6)
    )
}

// ============================================================================
// Password representation
// ============================================================================

/// Stored password value.
///
/// The variant is decided once, when the record is read, so callers never
/// sniff string prefixes themselves. On disk both variants are a plain
/// string.
#[derive(Clone, PartialEq, Eq)]
pub enum PasswordHash {
    /// One-way bcrypt hash
    Hashed(String),
    /// Plaintext from records created before hashing was introduced
    Legacy(String),
}

impl PasswordHash {
    /// Classify a raw stored value
    pub fn from_stored(value: impl Into<String>) -> Self {
        let value = value.into();
        if Self::looks_hashed(&value) {
            PasswordHash::Hashed(value)
        } else {
            PasswordHash::Legacy(value)
        }
    }

    fn looks_hashed(value: &str) -> bool {
        value.len() == BCRYPT_HASH_LEN && BCRYPT_PREFIXES.iter().any(|p| value.starts_with(p))
    }

    pub fn is_hashed(&self) -> bool {
        matches!(self, PasswordHash::Hashed(_))
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, PasswordHash::Legacy(_))
    }

    /// The value as written to disk
    pub fn as_stored(&self) -> &str {
        match self {
            PasswordHash::Hashed(v) | PasswordHash::Legacy(v) => v,
        }
    }
}

impl Default for PasswordHash {
    fn default() -> Self {
        PasswordHash::Legacy(String::new())
    }
}

// Never print the stored value, hashed or not.
impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordHash::Hashed(_) => write!(f, "Hashed(..)"),
            PasswordHash::Legacy(_) => write!(f, "Legacy(..)"),
        }
    }
}

impl Serialize for PasswordHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_stored())
    }
}

impl<'de> Deserialize<'de> for PasswordHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(PasswordHash::from_stored(value.unwrap_or_default()))
    }
}

// ============================================================================
// User Model
// ============================================================================

/// Access role carried by a credential and its access tokens.
///
/// Written lowercase. Reading is case-insensitive, and a missing, empty or
/// unrecognised role reads as `Staff`, the least-privileged role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Staff,
}

impl Role {
    /// Parse a stored role, falling back to `Staff`
    pub fn from_stored(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "manager" => Role::Manager,
            _ => Role::Staff,
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.as_deref().map(Role::from_stored).unwrap_or_default())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Manager => write!(f, "manager"),
            Role::Staff => write!(f, "staff"),
        }
    }
}

/// Credential record for a staff member
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: PasswordHash,
    #[serde(default)]
    pub needs_onboarding: bool,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub reporting_manager: String,
    #[serde(default)]
    pub staff_number: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Keys written by other services sharing the file
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Create a user with the given identity and password and empty profile
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        password: PasswordHash,
        role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            email: email.into(),
            password,
            needs_onboarding: false,
            role,
            department: String::new(),
            job_title: String::new(),
            reporting_manager: String::new(),
            staff_number: String::new(),
            status: String::new(),
            avatar: String::new(),
            created_at: Some(Utc::now()),
            extra: Map::new(),
        }
    }

    /// Case-insensitive email comparison
    pub fn email_matches(&self, email: &str) -> bool {
        self.email.to_lowercase() == email.to_lowercase()
    }
}

/// User without any password field (the only shape returned to callers)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub needs_onboarding: bool,
    pub role: Role,
    pub department: String,
    pub job_title: String,
    pub reporting_manager: String,
    pub staff_number: String,
    pub status: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            needs_onboarding: user.needs_onboarding,
            role: user.role,
            department: user.department,
            job_title: user.job_title,
            reporting_manager: user.reporting_manager,
            staff_number: user.staff_number,
            status: user.status,
            avatar: user.avatar,
            created_at: user.created_at,
        }
    }
}

// ============================================================================
// Session Model
// ============================================================================

/// Refresh-token session. `refresh_token` holds the bcrypt hash only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: String,
    pub user_id: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl UserSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

// ============================================================================
// Store aggregate
// ============================================================================

/// Whole JSON document backing the store.
///
/// A collection that is absent or `null` reads as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub users: Vec<User>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sessions: Vec<UserSession>,
    /// Owned by the websocket server; kept as-is
    #[serde(default, deserialize_with = "null_as_empty")]
    pub channels: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub messages: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tasks: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
