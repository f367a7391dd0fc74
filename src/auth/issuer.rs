//! Login: credential check, session creation and token minting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;
use tracing::{info, warn};

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::password::CredentialVerifier;
use crate::auth::session_store::{
    SessionStore, StoreError, generate_session_code, generate_session_secret,
};
use crate::auth::token::TokenCodec;
use crate::db::schema::{SessionCreate, SessionRecord, to_utc};
use crate::types::SessionCode;

/// Attempts at creating a session before a code collision is reported.
pub const MAX_SESSION_ATTEMPTS: usize = 3;

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_info: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Token handed back after a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Client-facing view of a session. Never carries the secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub session_code: SessionCode,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            id: record.id.to_string(),
            session_code: record.session_code.clone(),
            device_info: record.device_info.clone(),
            ip_address: record.ip_address.clone(),
            created_at: record.created_at.as_ref().map(to_utc),
            expires_at: to_utc(&record.expires_at),
        }
    }
}

/// Issues sessions and their tokens.
#[derive(Clone)]
pub struct SessionIssuer<S> {
    verifier: CredentialVerifier,
    sessions: S,
    codec: TokenCodec,
}

impl<S: SessionStore> SessionIssuer<S> {
    pub fn new(verifier: CredentialVerifier, sessions: S, codec: TokenCodec) -> Self {
        Self {
            verifier,
            sessions,
            codec,
        }
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    /// Verify credentials, open a new session and mint its token.
    ///
    /// Bad credentials return before anything is written. Earlier sessions
    /// of the same user stay active.
    pub async fn login(&self, request: LoginRequest) -> AuthResult<TokenResponse> {
        let user = self
            .verifier
            .verify(&request.email, &request.password)
            .await
            .inspect_err(|e| {
                if !e.is_server_failure() {
                    warn!(reason = e.kind(), "Login rejected");
                }
            })?;

        let issued_at = TokenCodec::now();
        let expires_at = self.codec.expires_at(issued_at);

        let mut attempt = 0;
        let session = loop {
            attempt += 1;
            let input = SessionCreate {
                user_id: user.id.clone(),
                session_code: generate_session_code(),
                secret_key: generate_session_secret(),
                device_info: request.device_info.clone(),
                ip_address: request.ip_address.clone(),
                expires_at,
            };

            match self.sessions.create(input).await {
                Ok(session) => break session,
                Err(StoreError::Conflict) if attempt < MAX_SESSION_ATTEMPTS => {
                    warn!(attempt, "Session code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        };

        let (access_token, expires_at) = self.codec.encode_at(
            &session.user_id,
            &session.session_code,
            &session.secret_key,
            issued_at,
        )?;

        info!(user_id = %user.id, session_id = %session.id, "User logged in");

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_at,
        })
    }

    /// Deactivate one session. Returns whether it was still active.
    pub async fn logout(&self, session_code: &SessionCode) -> AuthResult<bool> {
        let changed = self.sessions.deactivate(session_code).await?;
        if changed {
            info!("Session logged out");
        }
        Ok(changed)
    }

    /// Deactivate every session of `user_id`. Returns how many were active.
    pub async fn logout_everywhere(&self, user_id: &RecordId) -> AuthResult<usize> {
        let count = self.sessions.deactivate_all_for_user(user_id).await?;
        info!(user_id = %user_id, count, "Logged out everywhere");
        Ok(count)
    }

    /// Active sessions of `user_id`, newest first.
    pub async fn list_sessions(&self, user_id: &RecordId) -> AuthResult<Vec<SessionSummary>> {
        let sessions = self.sessions.list_active_for_user(user_id).await?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }
}
