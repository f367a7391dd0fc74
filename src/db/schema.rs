use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

use crate::types::{SessionCode, SessionSecret, ShortCode};

/// Convert a stored SurrealDB datetime into a chrono timestamp.
pub fn to_utc(datetime: &Datetime) -> DateTime<Utc> {
    DateTime::<Utc>::from(datetime.clone())
}

/// Persisted user account (table: `users`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable database identifier for this user.
    pub id: RecordId,
    /// Institution the user belongs to.
    pub institution_id: i64,
    pub name: String,
    /// Unique, lower-cased login email.
    pub email: String,
    /// Argon2id PHC string. Never leaves the server.
    pub password_hash: String,
    pub phone_number: Option<String>,
    /// Soft-disable flag; inactive users cannot log in.
    pub is_active: bool,
    /// Actor that provisioned this user, if it was another user.
    pub created_by: Option<RecordId>,
    /// Actor that last changed this user, if it was another user.
    pub updated_by: Option<RecordId>,
    pub created_at: Option<Datetime>,
    pub updated_at: Option<Datetime>,
}

/// Payload used when provisioning a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub institution_id: i64,
    pub name: String,
    pub email: String,
    /// Already-hashed password.
    pub password_hash: String,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub created_by: Option<RecordId>,
}

/// Persisted login session (table: `user_sessions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: RecordId,
    /// Owning user.
    pub user_id: RecordId,
    /// Public identifier carried inside the access token.
    pub session_code: SessionCode,
    /// Per-session HMAC key; only the server ever sees it.
    pub secret_key: SessionSecret,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    /// Absolute expiry of the session.
    pub expires_at: Datetime,
    pub is_active: bool,
    pub created_at: Option<Datetime>,
    pub updated_at: Option<Datetime>,
}

impl SessionRecord {
    /// A session is usable iff it is active and `now < expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < to_utc(&self.expires_at)
    }
}

/// Payload used when persisting a new session.
#[derive(Debug, Clone)]
pub struct SessionCreate {
    pub user_id: RecordId,
    pub session_code: SessionCode,
    pub secret_key: SessionSecret,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Persisted short URL (table: `short_urls`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortUrlRecord {
    pub id: RecordId,
    /// Owner of the short URL.
    pub user_id: RecordId,
    pub long_url: String,
    pub short_code: ShortCode,
    pub is_active: bool,
    pub created_at: Option<Datetime>,
    pub updated_at: Option<Datetime>,
}

/// Payload used when inserting a new short URL.
#[derive(Debug, Clone)]
pub struct ShortUrlCreate {
    pub user_id: RecordId,
    pub long_url: String,
    pub short_code: ShortCode,
}
