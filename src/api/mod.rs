// REST API: user sessions and short URLs

mod error;
mod middleware;

pub use error::{ApiError, INVALID_CREDENTIALS, INVALID_TOKEN, TOO_MANY_LOGINS, TOO_MANY_REQUESTS};
pub use middleware::{limit_api, limit_logins, peer_addr, require_session};

use axum::{
    Extension, Router,
    body::Bytes,
    extract::{Path, Query, Request, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode, header},
    middleware::from_fn_with_state,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::{
    CredentialVerifier, LoginRequest, SessionAuthenticator, SessionIssuer, SurrealSessionStore,
    TokenCodec, UserContext, UserStore,
};
use crate::config::AuthConfig;
use crate::db::Db;
use crate::db::schema::UserRecord;
use crate::rate_limit::{RateLimiter, client_key};
use crate::short_url::{CreateShortUrlRequest, PageRequest, ShortUrlResponse, ShortUrlService};
use crate::types::ShortCode;

/// Largest request body read by the JSON handlers.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared handler state. Every field is a cheap clone over the same pool.
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub issuer: SessionIssuer<SurrealSessionStore>,
    pub authenticator: SessionAuthenticator<SurrealSessionStore>,
    pub short_urls: ShortUrlService,
    pub login_limiter: RateLimiter,
    pub api_limiter: RateLimiter,
}

impl AppState {
    /// Wire the stores and services over `db`. Fails on an invalid config.
    pub fn new(db: Db, config: &AuthConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let users = UserStore::new(db.clone());
        let sessions = SurrealSessionStore::new(db.clone());
        let codec = TokenCodec::new(config.token_ttl());

        Ok(Self {
            issuer: SessionIssuer::new(
                CredentialVerifier::new(users.clone()),
                sessions.clone(),
                codec.clone(),
            ),
            authenticator: SessionAuthenticator::new(codec, sessions),
            short_urls: ShortUrlService::new(db),
            login_limiter: RateLimiter::for_logins(config),
            api_limiter: RateLimiter::for_api(config),
            users,
        })
    }
}

/// Public profile of the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub institution_id: i64,
    pub name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub is_active: bool,
}

impl From<UserRecord> for UserProfile {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            institution_id: user.institution_id,
            name: user.name,
            email: user.email,
            phone_number: user.phone_number,
            is_active: user.is_active,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/{code}", get(redirect_short_url));

    let login_routes = Router::new()
        .route("/api/v1/user/session", post(login))
        .route_layer(from_fn_with_state(state.clone(), limit_logins));

    // The limiter is added last so it runs before authentication.
    let user_routes = Router::new()
        .route("/api/v1/user/me", get(me))
        .route("/api/v1/user/sessions", get(list_sessions))
        .route("/api/v1/user/logout", post(logout))
        .route("/api/v1/user/logout-all", post(logout_all))
        .route_layer(from_fn_with_state(state.clone(), require_session))
        .route_layer(from_fn_with_state(state.clone(), limit_api));

    let short_url_routes = Router::new()
        .route(
            "/api/v1/short-url",
            post(create_short_url).get(list_short_urls),
        )
        .route("/api/v1/short-url/{code}", get(get_short_url))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    public
        .merge(login_routes)
        .merge(user_routes)
        .merge(short_url_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Whether the client asked for JSON instead of a redirect.
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Parse a JSON body, mapping any failure to 400.
fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn login(
    State(state): State<AppState>,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    let mut payload: LoginRequest = parse_body(&body)?;
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest(
            "email and password are required".to_string(),
        ));
    }

    // Fall back to what the connection says about the client.
    if payload.ip_address.is_none() {
        payload.ip_address = Some(client_key(&parts.headers, peer_addr(&parts.extensions)));
    }
    if payload.device_info.is_none() {
        payload.device_info = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
    }

    let response = state
        .issuer
        .login(payload)
        .await
        .map_err(ApiError::from_login)?;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn me(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .users
        .get_user(ctx.user_id())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(UserProfile::from(user)))
}

async fn list_sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Value>, ApiError> {
    let sessions = state.issuer.list_sessions(ctx.user_id()).await?;

    Ok(Json(serde_json::json!({
        "current_session": ctx.session_code(),
        "current_client": {
            "ip_address": ctx.ip_address(),
            "user_agent": ctx.user_agent(),
        },
        "sessions": sessions,
        "count": sessions.len(),
    })))
}

async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<StatusCode, ApiError> {
    info!(
        user_id = %ctx.user_id(),
        ip_address = ctx.ip_address(),
        user_agent = ctx.user_agent(),
        "Logout requested"
    );
    state.issuer.logout(ctx.session_code()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn logout_all(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<StatusCode, ApiError> {
    info!(
        user_id = %ctx.user_id(),
        ip_address = ctx.ip_address(),
        user_agent = ctx.user_agent(),
        "Logout everywhere requested"
    );
    state.issuer.logout_everywhere(ctx.user_id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_short_url(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let payload: CreateShortUrlRequest = parse_body(&body)?;
    let record = state.short_urls.create(ctx.user_id(), &payload.long_url).await?;

    Ok((StatusCode::CREATED, Json(ShortUrlResponse::from(record))))
}

async fn list_short_urls(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    query: Result<Query<PageRequest>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(page) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let page = state.short_urls.list(ctx.user_id(), page).await?;
    let short_urls: Vec<ShortUrlResponse> =
        page.items.into_iter().map(ShortUrlResponse::from).collect();

    Ok(Json(serde_json::json!({
        "short_urls": short_urls,
        "count": short_urls.len(),
        "pagination": page.info,
    })))
}

/// Redirect to the owner's long URL, or describe it when asked for JSON.
async fn get_short_url(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let record = state
        .short_urls
        .get(ctx.user_id(), &ShortCode::new(code))
        .await?;

    if wants_json(&headers) {
        return Ok(Json(ShortUrlResponse::from(record)).into_response());
    }
    Ok(found(record.long_url))
}

/// Public redirect: no token needed.
async fn redirect_short_url(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let record = state.short_urls.resolve(&ShortCode::new(code)).await?;
    Ok(found(record.long_url))
}
