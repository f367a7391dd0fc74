//! HTTP error responses.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::auth::AuthError;
use crate::short_url::ShortUrlError;

/// Message for every rejected login.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Message for every rejected bearer token.
pub const INVALID_TOKEN: &str = "Invalid or expired token";

pub const TOO_MANY_LOGINS: &str = "Too many login attempts. Please try again later.";

pub const TOO_MANY_REQUESTS: &str = "Rate limit exceeded. Please try again in 1 minute.";

/// Error returned by handlers and middleware. Renders as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str),
    BadRequest(String),
    NotFound(String),
    TooManyRequests {
        message: &'static str,
        retry_after_secs: u64,
    },
    Internal(String),
}

impl ApiError {
    /// Map a login failure. Rejections all read the same.
    pub fn from_login(err: AuthError) -> Self {
        if err.is_server_failure() {
            Self::Internal(err.to_string())
        } else {
            Self::Unauthorized(INVALID_CREDENTIALS)
        }
    }

    /// Map a request authentication failure. Rejections all read the same.
    pub fn from_authentication(err: AuthError) -> Self {
        if err.is_server_failure() {
            Self::Internal(err.to_string())
        } else {
            Self::Unauthorized(INVALID_TOKEN)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::from_authentication(err)
    }
}

impl From<ShortUrlError> for ApiError {
    fn from(err: ShortUrlError) -> Self {
        match err {
            ShortUrlError::InvalidUrl(_) => Self::BadRequest(err.to_string()),
            ShortUrlError::NotFound => Self::NotFound(err.to_string()),
            ShortUrlError::CodeExhausted | ShortUrlError::Storage(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, retry_after) = match self {
            Self::Unauthorized(msg) => (msg.to_string(), None),
            Self::BadRequest(msg) | Self::NotFound(msg) => (msg, None),
            Self::TooManyRequests {
                message,
                retry_after_secs,
            } => (message.to_string(), Some(retry_after_secs)),
            Self::Internal(detail) => {
                error!(error = %detail, "Request failed");
                ("Internal server error".to_string(), None)
            }
        };

        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
