// Core modules
mod config;
mod db;
mod rate_limit;
mod short_url;
mod types;

pub mod api;
pub mod auth;

// Re-export key types and functions
pub use config::{
    AuthConfig, DEFAULT_API_RATE_LIMIT, DEFAULT_API_RATE_WINDOW_SECONDS, DEFAULT_LOGIN_RATE_LIMIT,
    DEFAULT_LOGIN_RATE_WINDOW_SECONDS, DEFAULT_TOKEN_TTL_SECONDS, MAX_TOKEN_TTL_SECONDS,
};
pub use db::{
    DatabaseConfig, Db, SessionRecord, ShortUrlRecord, UserCreate, UserRecord, create_connection,
    ensure_schema,
};
pub use rate_limit::{RateLimiter, RateDecision, client_key};
pub use short_url::{
    PageInfo, PageRequest, ShortUrlError, ShortUrlPage, ShortUrlService, generate_short_code,
    validate_long_url,
};
pub use types::{SessionCode, SessionSecret, ShortCode};

pub use api::{AppState, create_router};
pub use auth::{
    AuthError, CredentialVerifier, LoginRequest, SessionAuthenticator, SessionIssuer,
    SessionStore, SurrealSessionStore, TokenCodec, TokenResponse, UserContext, UserStore,
    hash_password,
};
