//! Request authentication for bearer tokens.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::auth::context::UserContext;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::session_store::SessionStore;
use crate::auth::token::TokenCodec;

/// Pull the token out of an `Authorization: Bearer <token>` header value.
///
/// The scheme is case-insensitive; the token must be a single non-empty word.
pub fn extract_bearer(authorization: Option<&str>) -> AuthResult<&str> {
    let header = authorization
        .ok_or_else(|| AuthError::MalformedToken("missing authorization header".to_string()))?;

    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| AuthError::MalformedToken("expected bearer scheme".to_string()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedToken("expected bearer scheme".to_string()));
    }

    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MalformedToken("empty or invalid bearer token".to_string()));
    }

    Ok(token)
}

/// Admits or rejects requests by their bearer token.
///
/// A request is admitted only when:
/// 1. it carries a well-formed bearer token,
/// 2. the token's claimed session is active and unexpired in the store,
/// 3. the token was signed with that session's secret and has not expired,
/// 4. the token's user and session claims match the stored session.
///
/// The check is read-only. Deactivating a session makes its tokens fail
/// step 2 on the next request.
#[derive(Clone)]
pub struct SessionAuthenticator<S> {
    codec: TokenCodec,
    sessions: S,
}

impl<S: SessionStore> SessionAuthenticator<S> {
    /// Create a new authenticator.
    pub fn new(codec: TokenCodec, sessions: S) -> Self {
        Self { codec, sessions }
    }

    /// Get reference to the session store.
    pub fn sessions(&self) -> &S {
        &self.sessions
    }

    /// Authenticate a request from its `Authorization` header value.
    pub async fn authenticate(&self, authorization: Option<&str>) -> AuthResult<UserContext> {
        self.authenticate_at(authorization, Utc::now()).await
    }

    /// Same as [`authenticate`](Self::authenticate), checking token expiry
    /// against `now`.
    pub async fn authenticate_at(
        &self,
        authorization: Option<&str>,
        now: DateTime<Utc>,
    ) -> AuthResult<UserContext> {
        let token = extract_bearer(authorization).inspect_err(|e| {
            debug!(reason = e.kind(), "Rejected request: no usable bearer token");
        })?;

        let claimed = self.codec.parse_unverified(token).inspect_err(|e| {
            debug!(reason = e.kind(), "Rejected request: token does not parse");
        })?;
        let session_code = claimed.session_code();

        let session = match self.sessions.find_by_public_id(&session_code).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("Rejected request: session not found, inactive or expired");
                return Err(AuthError::SessionNotFound);
            }
            Err(e) => {
                warn!(error = %e, "Session lookup failed");
                return Err(e.into());
            }
        };

        let claims = self
            .codec
            .verify_at(token, &session.secret_key, now)
            .inspect_err(|e| {
                debug!(reason = e.kind(), session_id = %session.id, "Rejected request: token verification failed");
            })?;

        if claims.user_id != session.user_id.to_string()
            || claims.session_code != session.session_code.as_str()
        {
            debug!(session_id = %session.id, "Rejected request: claims do not match session");
            return Err(AuthError::InvalidSignature);
        }

        Ok(UserContext::new(session.user_id, session.session_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session_store::memory::MemorySessionStore;
    use crate::auth::session_store::{
        StoreError, generate_session_code, generate_session_secret,
    };
    use crate::db::schema::{SessionCreate, SessionRecord};
    use crate::types::{SessionCode, SessionSecret};
    use chrono::Duration;
    use surrealdb::RecordId;

    fn codec() -> TokenCodec {
        TokenCodec::new(Duration::hours(24))
    }

    fn user() -> RecordId {
        RecordId::from_table_key("users", "john")
    }

    /// Create a session in `store` and mint a token for it.
    async fn issue(store: &MemorySessionStore, issued_at: DateTime<Utc>) -> (String, SessionCode) {
        let codec = codec();
        let code = generate_session_code();
        let secret = generate_session_secret();
        store
            .create(SessionCreate {
                user_id: user(),
                session_code: code.clone(),
                secret_key: secret.clone(),
                device_info: None,
                ip_address: None,
                expires_at: codec.expires_at(issued_at),
            })
            .await
            .unwrap();
        let (token, _) = codec.encode_at(&user(), &code, &secret, issued_at).unwrap();
        (token, code)
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {}", token)
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
        assert_eq!(extract_bearer(Some("bearer abc")).unwrap(), "abc");
        assert_eq!(extract_bearer(Some("Bearer   abc  ")).unwrap(), "abc");

        for bad in [None, Some(""), Some("Bearer"), Some("Bearer "), Some("Basic abc"), Some("Bearer a b")] {
            assert_eq!(extract_bearer(bad).unwrap_err().kind(), "malformed_token", "{:?}", bad);
        }
    }

    #[tokio::test]
    async fn test_valid_token_is_admitted() {
        let store = MemorySessionStore::default();
        let (token, code) = issue(&store, TokenCodec::now()).await;
        let auth = SessionAuthenticator::new(codec(), store);

        let ctx = auth.authenticate(Some(&bearer(&token))).await.unwrap();
        assert_eq!(ctx.user_id(), &user());
        assert_eq!(ctx.session_code(), &code);
    }

    #[tokio::test]
    async fn test_missing_header_is_malformed() {
        let auth = SessionAuthenticator::new(codec(), MemorySessionStore::default());
        let err = auth.authenticate(None).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_token");
    }

    #[tokio::test]
    async fn test_garbage_token_is_malformed() {
        let auth = SessionAuthenticator::new(codec(), MemorySessionStore::default());
        let err = auth.authenticate(Some("Bearer not-a-jwt")).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_token");
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let store = MemorySessionStore::default();
        let (token, _) = issue(&store, TokenCodec::now()).await;
        // Same token, different store that never saw the session.
        let auth = SessionAuthenticator::new(codec(), MemorySessionStore::default());

        let err = auth.authenticate(Some(&bearer(&token))).await.unwrap_err();
        assert_eq!(err, AuthError::SessionNotFound);
    }

    #[tokio::test]
    async fn test_deactivated_session_is_rejected() {
        let store = MemorySessionStore::default();
        let (token, code) = issue(&store, TokenCodec::now()).await;
        let auth = SessionAuthenticator::new(codec(), store);

        auth.sessions().deactivate(&code).await.unwrap();

        let err = auth.authenticate(Some(&bearer(&token))).await.unwrap_err();
        assert_eq!(err, AuthError::SessionNotFound);
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_is_rejected() {
        let store = MemorySessionStore::default();
        let (_, code) = issue(&store, TokenCodec::now()).await;
        let forged_secret = SessionSecret::new("f".repeat(64));
        let (forged, _) = codec().encode(&user(), &code, &forged_secret).unwrap();
        let auth = SessionAuthenticator::new(codec(), store);

        let err = auth.authenticate(Some(&bearer(&forged))).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
    }

    #[tokio::test]
    async fn test_expired_token_on_live_session_is_rejected() {
        let store = MemorySessionStore::default();
        // Session row still valid for an hour, but the token says it expired.
        let now = TokenCodec::now();
        let code = generate_session_code();
        let secret = generate_session_secret();
        store
            .insert_raw(SessionRecord {
                id: RecordId::from_table_key("user_sessions", "live"),
                user_id: user(),
                session_code: code.clone(),
                secret_key: secret.clone(),
                device_info: None,
                ip_address: None,
                expires_at: (now + Duration::hours(1)).into(),
                is_active: true,
                created_at: None,
                updated_at: None,
            })
            .await;
        let (token, _) = codec()
            .encode_at(&user(), &code, &secret, now - Duration::hours(25))
            .unwrap();
        let auth = SessionAuthenticator::new(codec(), store);

        let err = auth.authenticate(Some(&bearer(&token))).await.unwrap_err();
        assert_eq!(err, AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn test_expiry_boundary_rejects_at_exact_expiry() {
        let store = MemorySessionStore::default();
        let now = TokenCodec::now();
        let (token, _) = issue(&store, now).await;
        let auth = SessionAuthenticator::new(codec(), store);
        let expires_at = codec().expires_at(now);

        assert!(auth.authenticate_at(Some(&bearer(&token)), expires_at - Duration::seconds(1)).await.is_ok());
        assert_eq!(
            auth.authenticate_at(Some(&bearer(&token)), expires_at).await.unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_claims_for_other_user_are_rejected() {
        let store = MemorySessionStore::default();
        let now = TokenCodec::now();
        let code = generate_session_code();
        let secret = generate_session_secret();
        store
            .create(SessionCreate {
                user_id: user(),
                session_code: code.clone(),
                secret_key: secret.clone(),
                device_info: None,
                ip_address: None,
                expires_at: codec().expires_at(now),
            })
            .await
            .unwrap();
        // Correct secret, but the token names a different user.
        let mallory = RecordId::from_table_key("users", "mallory");
        let (token, _) = codec().encode_at(&mallory, &code, &secret, now).unwrap();
        let auth = SessionAuthenticator::new(codec(), store);

        let err = auth.authenticate(Some(&bearer(&token))).await.unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature);
    }

    struct FailingStore;

    impl SessionStore for FailingStore {
        async fn create(&self, _input: SessionCreate) -> Result<SessionRecord, StoreError> {
            Err(StoreError::Database("unreachable".into()))
        }

        async fn find_by_public_id(
            &self,
            _code: &SessionCode,
        ) -> Result<Option<SessionRecord>, StoreError> {
            Err(StoreError::Database("unreachable".into()))
        }

        async fn deactivate(&self, _code: &SessionCode) -> Result<bool, StoreError> {
            Err(StoreError::Database("unreachable".into()))
        }

        async fn deactivate_all_for_user(&self, _user_id: &RecordId) -> Result<usize, StoreError> {
            Err(StoreError::Database("unreachable".into()))
        }

        async fn list_active_for_user(
            &self,
            _user_id: &RecordId,
        ) -> Result<Vec<SessionRecord>, StoreError> {
            Err(StoreError::Database("unreachable".into()))
        }

        async fn purge_expired(&self) -> Result<usize, StoreError> {
            Err(StoreError::Database("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_not_an_auth_rejection() {
        let store = MemorySessionStore::default();
        let (token, _) = issue(&store, TokenCodec::now()).await;
        let auth = SessionAuthenticator::new(codec(), FailingStore);

        let err = auth.authenticate(Some(&bearer(&token))).await.unwrap_err();
        assert!(err.is_storage_failure());
    }
}
