use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Default access token / session lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Longest accepted token / session lifetime: 366 days.
pub const MAX_TOKEN_TTL_SECONDS: u64 = 366 * 24 * 60 * 60;

/// Default number of login attempts allowed per client within one window.
pub const DEFAULT_LOGIN_RATE_LIMIT: u32 = 5;

/// Default login rate limit window: 3 minutes.
pub const DEFAULT_LOGIN_RATE_WINDOW_SECONDS: u64 = 3 * 60;

/// Default number of requests per client to the other `/api/v1/user` routes.
pub const DEFAULT_API_RATE_LIMIT: u32 = 100;

/// Default window for the user route limiter: 1 minute.
pub const DEFAULT_API_RATE_WINDOW_SECONDS: u64 = 60;

/// Authentication settings handed to the issuer and authenticator at startup.
///
/// There is intentionally no signing key here: every session carries its own
/// secret in the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a session and of the token minted for it, in seconds.
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// Login attempts allowed per client key within one window.
    #[serde(default = "default_login_rate_limit")]
    pub login_rate_limit: u32,
    /// Length of the login rate limit window in seconds.
    #[serde(default = "default_login_rate_window_seconds")]
    pub login_rate_window_seconds: u64,
    /// Requests allowed per client key on the authenticated user routes.
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: u32,
    #[serde(default = "default_api_rate_window_seconds")]
    pub api_rate_window_seconds: u64,
}

fn default_token_ttl_seconds() -> u64 {
    DEFAULT_TOKEN_TTL_SECONDS
}

fn default_login_rate_limit() -> u32 {
    DEFAULT_LOGIN_RATE_LIMIT
}

fn default_login_rate_window_seconds() -> u64 {
    DEFAULT_LOGIN_RATE_WINDOW_SECONDS
}

fn default_api_rate_limit() -> u32 {
    DEFAULT_API_RATE_LIMIT
}

fn default_api_rate_window_seconds() -> u64 {
    DEFAULT_API_RATE_WINDOW_SECONDS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            login_rate_limit: DEFAULT_LOGIN_RATE_LIMIT,
            login_rate_window_seconds: DEFAULT_LOGIN_RATE_WINDOW_SECONDS,
            api_rate_limit: DEFAULT_API_RATE_LIMIT,
            api_rate_window_seconds: DEFAULT_API_RATE_WINDOW_SECONDS,
        }
    }
}

impl AuthConfig {
    /// Config with a custom token lifetime and default rate limiting.
    pub fn with_token_ttl(token_ttl_seconds: u64) -> Self {
        Self {
            token_ttl_seconds,
            ..Default::default()
        }
    }

    /// Reject settings that would mint already-expired tokens, overflow the
    /// expiry arithmetic, or disable a limiter by accident.
    pub fn validate(&self) -> Result<()> {
        if self.token_ttl_seconds == 0 {
            bail!("token TTL must be at least 1 second");
        }
        if self.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
            bail!(
                "token TTL of {} seconds exceeds the maximum of {} seconds",
                self.token_ttl_seconds,
                MAX_TOKEN_TTL_SECONDS
            );
        }
        if self.login_rate_limit == 0 || self.api_rate_limit == 0 {
            bail!("rate limits must allow at least 1 request per window");
        }
        if self.login_rate_window_seconds == 0 || self.api_rate_window_seconds == 0 {
            bail!("rate limit windows must be at least 1 second");
        }
        Ok(())
    }

    /// Token lifetime as a `chrono::Duration`, clamped to
    /// `1..=MAX_TOKEN_TTL_SECONDS`.
    pub fn token_ttl(&self) -> chrono::Duration {
        let secs = self.token_ttl_seconds.clamp(1, MAX_TOKEN_TTL_SECONDS);
        chrono::Duration::seconds(secs as i64)
    }

    /// Login rate limit window as a `std::time::Duration`.
    pub fn login_rate_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.login_rate_window_seconds)
    }

    pub fn api_rate_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.api_rate_window_seconds)
    }
}
