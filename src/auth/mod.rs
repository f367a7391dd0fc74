//! Session-based authentication.
//!
//! A login opens a session row holding a random public code and a random
//! private secret. The access token names the session by its code and is
//! signed with the session's own secret, so:
//!
//! - there is no global signing key to leak,
//! - deactivating a session revokes its tokens on the next request,
//! - a leaked secret only forges tokens for its own session.
//!
//! ## Flow
//!
//! ```ignore
//! // Login
//! let response = issuer.login(LoginRequest { email, password, .. }).await?;
//!
//! // Every protected request
//! let ctx = authenticator.authenticate(headers.get("authorization")).await?;
//! ```

mod context;
mod error;
mod extractor;
mod issuer;
mod password;
mod session_store;
mod token;
mod user_store;


pub use context::UserContext;
pub use error::{AuthError, AuthResult};
pub use extractor::{SessionAuthenticator, extract_bearer};
pub use issuer::{LoginRequest, MAX_SESSION_ATTEMPTS, SessionIssuer, SessionSummary, TokenResponse};
pub use password::{CredentialVerifier, hash_password, verify_password};
pub use session_store::{
    SESSION_TOKEN_BYTES, SESSION_TOKEN_HEX_LEN, SessionStore, StoreError, SurrealSessionStore,
    generate_session_code, generate_session_secret,
};
pub use token::{SessionClaims, TokenCodec};
pub use user_store::{UserStore, normalize_email};
