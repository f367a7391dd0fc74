//! Request gates: session authentication and per-client rate limiting.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Extensions, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::api::error::{ApiError, TOO_MANY_LOGINS, TOO_MANY_REQUESTS};
use crate::rate_limit::{RateDecision, RateLimiter, client_key};

/// Peer address, when the server was started with connect info.
pub fn peer_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Admit the request only with a valid session token. On success the
/// request carries a [`UserContext`](crate::auth::UserContext) extension.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let client = client_key(headers, peer_addr(request.extensions()));

    let ctx = match state.authenticator.authenticate(authorization.as_deref()).await {
        Ok(ctx) => ctx.with_client_info(Some(client), user_agent),
        Err(e) => {
            debug!(
                client = %client,
                user_agent = user_agent.as_deref(),
                reason = e.kind(),
                "Request rejected"
            );
            return Err(ApiError::from_authentication(e));
        }
    };

    debug!(
        user_id = %ctx.user_id(),
        ip_address = ctx.ip_address(),
        user_agent = ctx.user_agent(),
        "Request admitted"
    );

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Count the attempt against the client's login budget.
pub async fn limit_logins(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state.login_limiter, TOO_MANY_LOGINS, request, next).await
}

/// Count the request against the client's budget for the user routes.
pub async fn limit_api(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    enforce(&state.api_limiter, TOO_MANY_REQUESTS, request, next).await
}

async fn enforce(
    limiter: &RateLimiter,
    message: &'static str,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = client_key(request.headers(), peer_addr(request.extensions()));

    match limiter.check(&key).await {
        RateDecision::Allowed { .. } => Ok(next.run(request).await),
        RateDecision::Limited { retry_after } => {
            warn!(client = %key, path = %request.uri().path(), "Rate limit exceeded");
            Err(ApiError::TooManyRequests {
                message,
                retry_after_secs: retry_after.as_secs().max(1),
            })
        }
    }
}
