//! Session persistence.
//!
//! [`SessionStore`] is the storage capability the issuer and authenticator
//! depend on. [`SurrealSessionStore`] implements it over the `user_sessions`
//! table. Validity (`is_active = true AND expires_at > now`) is always part
//! of the query itself.

use std::fmt;

use rand::RngCore;
use surrealdb::RecordId;
use surrealdb::sql::Datetime;
use tracing::info;

use crate::auth::error::AuthError;
use crate::db::schema::{SessionCreate, SessionRecord};
use crate::db::{Db, is_unique_violation};
use crate::types::{SessionCode, SessionSecret};

/// Bytes of entropy in a session code and in a session secret.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Length of the hex encoding of [`SESSION_TOKEN_BYTES`].
pub const SESSION_TOKEN_HEX_LEN: usize = SESSION_TOKEN_BYTES * 2;

fn random_hex() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a public session code: 256 random bits, hex-encoded.
pub fn generate_session_code() -> SessionCode {
    SessionCode::new(random_hex())
}

/// Generate a private session secret: 256 random bits, hex-encoded.
pub fn generate_session_secret() -> SessionSecret {
    SessionSecret::new(random_hex())
}

/// Session store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The session code is already taken. Retry with a new code.
    Conflict,
    /// The store failed or returned something unreadable.
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "Session code already exists"),
            Self::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::SessionConflict,
            StoreError::Database(msg) => AuthError::Storage(msg),
        }
    }
}

impl From<surrealdb::Error> for StoreError {
    fn from(err: surrealdb::Error) -> Self {
        if is_unique_violation(&err) {
            StoreError::Conflict
        } else {
            StoreError::Database(err.to_string())
        }
    }
}

/// Storage capability for login sessions.
pub trait SessionStore: Send + Sync {
    /// Insert a new session. A duplicate session code is `Conflict`, never
    /// an overwrite.
    fn create(
        &self,
        input: SessionCreate,
    ) -> impl Future<Output = Result<SessionRecord, StoreError>> + Send;

    /// Find a session by its public code, only if it is active and unexpired.
    fn find_by_public_id(
        &self,
        code: &SessionCode,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StoreError>> + Send;

    /// Deactivate one session. Returns whether an active session was changed.
    fn deactivate(&self, code: &SessionCode)
    -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Deactivate every session of a user. Returns how many were active.
    fn deactivate_all_for_user(
        &self,
        user_id: &RecordId,
    ) -> impl Future<Output = Result<usize, StoreError>> + Send;

    /// A user's active, unexpired sessions, newest first.
    fn list_active_for_user(
        &self,
        user_id: &RecordId,
    ) -> impl Future<Output = Result<Vec<SessionRecord>, StoreError>> + Send;

    /// Delete expired or inactive sessions. Returns how many were removed.
    fn purge_expired(&self) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

/// SurrealDB implementation of [`SessionStore`].
#[derive(Clone)]
pub struct SurrealSessionStore {
    db: Db,
}

impl SurrealSessionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

impl SessionStore for SurrealSessionStore {
    async fn create(&self, input: SessionCreate) -> Result<SessionRecord, StoreError> {
        let query = r#"
            CREATE user_sessions CONTENT {
                user_id: $user_id,
                session_code: $session_code,
                secret_key: $secret_key,
                device_info: $device_info,
                ip_address: $ip_address,
                expires_at: $expires_at,
                is_active: true
            }
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("user_id", input.user_id))
            .bind(("session_code", input.session_code))
            .bind(("secret_key", input.secret_key))
            .bind(("device_info", input.device_info))
            .bind(("ip_address", input.ip_address))
            .bind(("expires_at", Datetime::from(input.expires_at)))
            .await?
            .check()?;

        let created: Vec<SessionRecord> = res.take(0)?;
        created
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Database("failed to create session".to_string()))
    }

    async fn find_by_public_id(
        &self,
        code: &SessionCode,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let query = r#"
            SELECT * FROM user_sessions
            WHERE session_code = $session_code
              AND is_active = true
              AND expires_at > time::now()
            LIMIT 1
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("session_code", code.clone()))
            .await?;

        let rows: Vec<SessionRecord> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn deactivate(&self, code: &SessionCode) -> Result<bool, StoreError> {
        let query = r#"
            UPDATE user_sessions SET is_active = false
            WHERE session_code = $session_code AND is_active = true
            RETURN AFTER
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("session_code", code.clone()))
            .await?
            .check()?;

        let changed: Vec<SessionRecord> = res.take(0)?;
        Ok(!changed.is_empty())
    }

    async fn deactivate_all_for_user(&self, user_id: &RecordId) -> Result<usize, StoreError> {
        let query = r#"
            UPDATE user_sessions SET is_active = false
            WHERE user_id = $user_id AND is_active = true
            RETURN AFTER
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("user_id", user_id.clone()))
            .await?
            .check()?;

        let changed: Vec<SessionRecord> = res.take(0)?;
        info!(user_id = %user_id, count = changed.len(), "Deactivated user sessions");
        Ok(changed.len())
    }

    async fn list_active_for_user(
        &self,
        user_id: &RecordId,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let query = r#"
            SELECT * FROM user_sessions
            WHERE user_id = $user_id
              AND is_active = true
              AND expires_at > time::now()
            ORDER BY created_at DESC
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("user_id", user_id.clone()))
            .await?;

        let rows: Vec<SessionRecord> = res.take(0)?;
        Ok(rows)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let query = r#"
            DELETE user_sessions
            WHERE is_active = false OR expires_at <= time::now()
            RETURN BEFORE
        "#;

        let mut res = self.db.query(query).await?.check()?;
        let removed: Vec<SessionRecord> = res.take(0)?;
        Ok(removed.len())
    }
}

/// In-memory [`SessionStore`] for exercising auth logic without a database.
#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Arc;

    use chrono::Utc;
    use tokio::sync::RwLock;

    use super::*;

    #[derive(Clone, Default)]
    pub(crate) struct MemorySessionStore {
        rows: Arc<RwLock<Vec<SessionRecord>>>,
    }

    impl MemorySessionStore {
        /// Insert a row as-is, bypassing validation.
        pub(crate) async fn insert_raw(&self, record: SessionRecord) {
            self.rows.write().await.push(record);
        }

        pub(crate) async fn len(&self) -> usize {
            self.rows.read().await.len()
        }
    }

    impl SessionStore for MemorySessionStore {
        async fn create(&self, input: SessionCreate) -> Result<SessionRecord, StoreError> {
            let mut rows = self.rows.write().await;
            if rows.iter().any(|r| r.session_code == input.session_code) {
                return Err(StoreError::Conflict);
            }
            let now = Datetime::from(Utc::now());
            let record = SessionRecord {
                id: RecordId::from_table_key("user_sessions", format!("s{}", rows.len() + 1)),
                user_id: input.user_id,
                session_code: input.session_code,
                secret_key: input.secret_key,
                device_info: input.device_info,
                ip_address: input.ip_address,
                expires_at: Datetime::from(input.expires_at),
                is_active: true,
                created_at: Some(now.clone()),
                updated_at: Some(now),
            };
            rows.push(record.clone());
            Ok(record)
        }

        async fn find_by_public_id(
            &self,
            code: &SessionCode,
        ) -> Result<Option<SessionRecord>, StoreError> {
            let now = Utc::now();
            let rows = self.rows.read().await;
            Ok(rows
                .iter()
                .find(|r| &r.session_code == code && r.is_valid_at(now))
                .cloned())
        }

        async fn deactivate(&self, code: &SessionCode) -> Result<bool, StoreError> {
            let mut rows = self.rows.write().await;
            let mut changed = false;
            for row in rows.iter_mut().filter(|r| &r.session_code == code && r.is_active) {
                row.is_active = false;
                changed = true;
            }
            Ok(changed)
        }

        async fn deactivate_all_for_user(&self, user_id: &RecordId) -> Result<usize, StoreError> {
            let mut rows = self.rows.write().await;
            let mut count = 0;
            for row in rows.iter_mut().filter(|r| &r.user_id == user_id && r.is_active) {
                row.is_active = false;
                count += 1;
            }
            Ok(count)
        }

        async fn list_active_for_user(
            &self,
            user_id: &RecordId,
        ) -> Result<Vec<SessionRecord>, StoreError> {
            let now = Utc::now();
            let rows = self.rows.read().await;
            Ok(rows
                .iter()
                .rev()
                .filter(|r| &r.user_id == user_id && r.is_valid_at(now))
                .cloned()
                .collect())
        }

        async fn purge_expired(&self) -> Result<usize, StoreError> {
            let now = Utc::now();
            let mut rows = self.rows.write().await;
            let before = rows.len();
            rows.retain(|r| r.is_valid_at(now));
            Ok(before - rows.len())
        }
    }
}
