//! User context for request-scoped identity.

use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::types::SessionCode;

/// Identity of an admitted request.
///
/// Built by the authenticator once the token checks out and handed to
/// downstream handlers. It is immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    /// Database record ID for this user
    user_id: RecordId,
    /// Session the request's token is bound to
    session_code: SessionCode,
    /// Client IP address (for audit logging)
    ip_address: Option<String>,
    /// Client user agent (for audit logging)
    user_agent: Option<String>,
}

impl UserContext {
    /// Create a new user context.
    pub fn new(user_id: RecordId, session_code: SessionCode) -> Self {
        Self {
            user_id,
            session_code,
            ip_address: None,
            user_agent: None,
        }
    }

    /// Set client metadata for audit logging.
    pub fn with_client_info(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    /// Get the database user ID.
    pub fn user_id(&self) -> &RecordId {
        &self.user_id
    }

    /// Get the session this request is authenticated under.
    pub fn session_code(&self) -> &SessionCode {
        &self.session_code
    }

    /// Get the client IP address for audit logging.
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Get the client user agent for audit logging.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}
