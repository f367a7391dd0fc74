//! Error types for login and request authentication.

use std::fmt;

/// Errors produced by credential checks, session issuance and token checks.
///
/// Each kind stays distinct for logging. At the HTTP boundary every
/// rejection collapses into the same generic 401; server failures
/// (see [`AuthError::is_server_failure`]) become a 500.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Unknown email, inactive user or wrong password. Never says which.
    InvalidCredentials,

    /// Missing or non-Bearer `Authorization` header, or a token that does
    /// not parse.
    MalformedToken(String),

    /// The claimed session does not resolve to an active, unexpired row.
    SessionNotFound,

    /// The token was not signed with the claimed session's secret, or its
    /// claims do not match that session.
    InvalidSignature,

    /// The token's embedded expiry is not in the future.
    TokenExpired,

    /// A freshly generated session code collided with an existing one.
    /// Retryable: a new code will almost surely not collide.
    SessionConflict,

    /// The backing store failed. Not an authentication outcome.
    Storage(String),

    /// Any other server-side fault, such as a token that cannot be signed.
    Internal(String),
}

impl AuthError {
    /// Whether this is an infrastructure failure rather than a rejection.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Whether the failure is the server's fault rather than the caller's.
    pub fn is_server_failure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Internal(_) | Self::SessionConflict
        )
    }

    /// Short stable label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::MalformedToken(_) => "malformed_token",
            Self::SessionNotFound => "session_not_found",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::SessionConflict => "session_conflict",
            Self::Storage(_) => "storage_failure",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::MalformedToken(msg) => write!(f, "Malformed token: {}", msg),
            Self::SessionNotFound => write!(f, "Session not found or no longer active"),
            Self::InvalidSignature => write!(f, "Token signature does not match session"),
            Self::TokenExpired => write!(f, "Token has expired"),
            Self::SessionConflict => write!(f, "Session identifier collision"),
            Self::Storage(msg) => write!(f, "Storage failure: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
