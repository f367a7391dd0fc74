//! Access token encoding and verification.
//!
//! Tokens are HS256 JWTs signed with the secret of the session they belong
//! to. The claims name that session, so a verifier first reads them
//! unverified, loads the session's secret, and only then checks the
//! signature. There is no process-wide signing key.

use chrono::{DateTime, SubsecRound, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::auth::error::{AuthError, AuthResult};
use crate::types::{SessionCode, SessionSecret};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Owning user, as the record id string (`users:...`).
    pub user_id: String,
    /// Public code of the session whose secret signed this token.
    pub session_code: String,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expires at, seconds since the epoch.
    pub exp: i64,
}

impl SessionClaims {
    pub fn session_code(&self) -> SessionCode {
        SessionCode::new(self.session_code.clone())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Strict expiry: a token is expired from the second `exp` is reached.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Mints and checks session-bound tokens.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    ttl: chrono::Duration,
}

impl TokenCodec {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self { ttl }
    }

    /// Current time, truncated to the second resolution of the claims.
    pub fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }

    /// Expiry of a token (and session) issued at `issued_at`.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + self.ttl
    }

    /// Sign a token for the given session, valid from now for the codec TTL.
    pub fn encode(
        &self,
        user_id: &RecordId,
        session_code: &SessionCode,
        secret: &SessionSecret,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        self.encode_at(user_id, session_code, secret, Self::now())
    }

    /// Sign a token as if issued at `issued_at`.
    pub fn encode_at(
        &self,
        user_id: &RecordId,
        session_code: &SessionCode,
        secret: &SessionSecret,
        issued_at: DateTime<Utc>,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        let expires_at = self.expires_at(issued_at);
        let claims = SessionClaims {
            user_id: user_id.to_string(),
            session_code: session_code.as_str().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.expose()),
        )
        .map_err(|e| AuthError::Internal(format!("token encoding failed: {}", e)))?;

        Ok((token, expires_at))
    }

    /// Read the claims without checking the signature or expiry.
    ///
    /// Only used to find which session's secret to verify with. The result
    /// proves nothing about who produced the token.
    pub fn parse_unverified(&self, token: &str) -> AuthResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<SessionClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::MalformedToken(e.to_string()))
    }

    /// Check signature and expiry against `secret`.
    pub fn verify(&self, token: &str, secret: &SessionSecret) -> AuthResult<SessionClaims> {
        self.verify_at(token, secret, Utc::now())
    }

    /// Check signature against `secret` and expiry against `now`.
    pub fn verify_at(
        &self,
        token: &str,
        secret: &SessionSecret,
        now: DateTime<Utc>,
    ) -> AuthResult<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below with a strict boundary and no leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        let claims = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(secret.expose()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::MalformedToken(e.to_string()),
        })?;

        if claims.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(Duration::hours(24))
    }

    fn user() -> RecordId {
        RecordId::from_table_key("users", "john")
    }

    fn code() -> SessionCode {
        SessionCode::new("a".repeat(64))
    }

    fn secret() -> SessionSecret {
        SessionSecret::new("b".repeat(64))
    }

    #[test]
    fn test_token_verifies_right_after_issuance() {
        let codec = codec();
        let (token, expires_at) = codec.encode(&user(), &code(), &secret()).unwrap();

        assert!(!token.is_empty());
        let claims = codec.verify(&token, &secret()).unwrap();
        assert_eq!(claims.user_id, user().to_string());
        assert_eq!(claims.session_code(), code());
        assert_eq!(claims.expires_at(), Some(expires_at));
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let codec = codec();
        let (token, _) = codec.encode(&user(), &code(), &secret()).unwrap();

        let other = SessionSecret::new("c".repeat(64));
        assert_eq!(codec.verify(&token, &other).unwrap_err(), AuthError::InvalidSignature);
    }

    #[test]
    fn test_parse_unverified_is_idempotent() {
        let codec = codec();
        let (token, _) = codec.encode(&user(), &code(), &secret()).unwrap();

        let first = codec.parse_unverified(&token).unwrap();
        let second = codec.parse_unverified(&token).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.session_code(), code());
    }

    #[test]
    fn test_parse_unverified_accepts_expired_token() {
        let codec = codec();
        let issued_at = TokenCodec::now() - Duration::days(3);
        let (token, _) = codec.encode_at(&user(), &code(), &secret(), issued_at).unwrap();

        assert!(codec.parse_unverified(&token).is_ok());
    }

    #[test]
    fn test_parse_unverified_rejects_garbage() {
        let err = codec().parse_unverified("not.a.token").unwrap_err();
        assert_eq!(err.kind(), "malformed_token");
        assert!(codec().parse_unverified("").is_err());
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let codec = TokenCodec::new(Duration::seconds(60));
        let issued_at = TokenCodec::now();
        let (token, expires_at) = codec.encode_at(&user(), &code(), &secret(), issued_at).unwrap();

        let just_before = expires_at - Duration::seconds(1);
        assert!(codec.verify_at(&token, &secret(), just_before).is_ok());
        assert_eq!(
            codec.verify_at(&token, &secret(), expires_at).unwrap_err(),
            AuthError::TokenExpired
        );
        assert_eq!(
            codec
                .verify_at(&token, &secret(), expires_at + Duration::seconds(1))
                .unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let codec = codec();
        let issued_at = TokenCodec::now() - Duration::hours(25);
        let (token, _) = codec.encode_at(&user(), &code(), &secret(), issued_at).unwrap();

        assert_eq!(codec.verify(&token, &secret()).unwrap_err(), AuthError::TokenExpired);
    }

    #[test]
    fn test_tampered_payload_fails() {
        let codec = codec();
        let (token, _) = codec.encode(&user(), &code(), &secret()).unwrap();
        let (other, _) = codec
            .encode(&RecordId::from_table_key("users", "mallory"), &code(), &secret())
            .unwrap();

        // Splice the other token's payload under the original signature.
        let parts: Vec<&str> = token.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], other_parts[1], parts[2]);

        assert_eq!(codec.verify(&forged, &secret()).unwrap_err(), AuthError::InvalidSignature);
    }
}
