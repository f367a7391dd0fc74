//! Short URLs owned by authenticated users.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;
use tracing::{info, warn};
use url::Url;

use crate::db::schema::{ShortUrlCreate, ShortUrlRecord, to_utc};
use crate::db::{Db, QueryBuilder, is_unique_violation};
use crate::types::ShortCode;

/// Random bytes behind a short code. Six bytes encode to eight characters.
const SHORT_CODE_BYTES: usize = 6;

/// Length of a generated short code.
pub const SHORT_CODE_LEN: usize = 8;

/// Attempts at inserting a short URL before a code collision is reported.
const MAX_CODE_ATTEMPTS: usize = 5;

pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Largest page a client may ask for.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortUrlError {
    /// Not an absolute http(s) URL.
    InvalidUrl(String),
    /// Unknown code, or owned by someone else.
    NotFound,
    /// Could not find a free code.
    CodeExhausted,
    Storage(String),
}

impl fmt::Display for ShortUrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            Self::NotFound => write!(f, "Short URL not found"),
            Self::CodeExhausted => write!(f, "Could not allocate a short code"),
            Self::Storage(msg) => write!(f, "Storage failure: {}", msg),
        }
    }
}

impl std::error::Error for ShortUrlError {}

/// Request body for creating a short URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShortUrlRequest {
    pub long_url: String,
}

/// Client-facing view of a short URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortUrlResponse {
    pub id: String,
    pub short_code: ShortCode,
    pub long_url: String,
    pub user_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<ShortUrlRecord> for ShortUrlResponse {
    fn from(record: ShortUrlRecord) -> Self {
        Self {
            id: record.id.to_string(),
            short_code: record.short_code,
            long_url: record.long_url,
            user_id: record.user_id.to_string(),
            created_at: record.created_at.as_ref().map(to_utc),
        }
    }
}

/// `?page=&page_size=` query. Missing, zero or negative values fall back to
/// the defaults; `page_size` is capped at [`MAX_PAGE_SIZE`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    /// One-based page number.
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p > 0).unwrap_or(1)
    }

    pub fn page_size(&self) -> i64 {
        match self.page_size {
            Some(size) if size > 0 => size.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }
}

/// Position of a page within the full result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: i64,
    pub page_size: i64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageInfo {
    pub fn new(request: &PageRequest, total: u64) -> Self {
        let page = request.page();
        let page_size = request.page_size();
        let total_pages = total.div_ceil(page_size as u64);

        Self {
            page,
            page_size,
            total,
            total_pages,
            has_next: (page as u64) < total_pages,
            has_previous: page > 1,
        }
    }
}

/// One page of a user's short URLs.
#[derive(Debug, Clone)]
pub struct ShortUrlPage {
    pub items: Vec<ShortUrlRecord>,
    pub info: PageInfo,
}

/// Generate a random URL-safe short code.
pub fn generate_short_code() -> ShortCode {
    let mut bytes = [0u8; SHORT_CODE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    ShortCode::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// Accept only absolute `http`/`https` URLs with a host.
pub fn validate_long_url(raw: &str) -> Result<String, ShortUrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ShortUrlError::InvalidUrl("long_url is required".to_string()));
    }

    let parsed = Url::parse(trimmed).map_err(|e| ShortUrlError::InvalidUrl(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ShortUrlError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ShortUrlError::InvalidUrl("missing host".to_string()));
    }

    Ok(parsed.to_string())
}

/// Creates and reads short URLs on behalf of one user at a time, and
/// resolves codes for the public redirect.
#[derive(Clone)]
pub struct ShortUrlService {
    db: Db,
}

impl ShortUrlService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: &RecordId,
        long_url: &str,
    ) -> Result<ShortUrlRecord, ShortUrlError> {
        let long_url = validate_long_url(long_url)?;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let data = ShortUrlCreate {
                user_id: user_id.clone(),
                long_url: long_url.clone(),
                short_code: generate_short_code(),
            };

            match QueryBuilder::create_short_url(&self.db, &data).await {
                Ok(record) => {
                    info!(user_id = %user_id, short_code = %record.short_code, "Created short URL");
                    return Ok(record);
                }
                Err(e)
                    if e
                        .downcast_ref::<surrealdb::Error>()
                        .is_some_and(is_unique_violation) =>
                {
                    warn!(attempt, "Short code collision, retrying");
                }
                Err(e) => return Err(ShortUrlError::Storage(e.to_string())),
            }
        }

        Err(ShortUrlError::CodeExhausted)
    }

    pub async fn get(
        &self,
        user_id: &RecordId,
        short_code: &ShortCode,
    ) -> Result<ShortUrlRecord, ShortUrlError> {
        QueryBuilder::find_short_url(&self.db, short_code, user_id)
            .await
            .map_err(|e| ShortUrlError::Storage(e.to_string()))?
            .ok_or(ShortUrlError::NotFound)
    }

    /// Look up an active code regardless of owner.
    pub async fn resolve(&self, short_code: &ShortCode) -> Result<ShortUrlRecord, ShortUrlError> {
        QueryBuilder::find_active_short_url_by_code(&self.db, short_code)
            .await
            .map_err(|e| ShortUrlError::Storage(e.to_string()))?
            .ok_or(ShortUrlError::NotFound)
    }

    pub async fn list(
        &self,
        user_id: &RecordId,
        request: PageRequest,
    ) -> Result<ShortUrlPage, ShortUrlError> {
        let (items, total) = QueryBuilder::list_short_urls(
            &self.db,
            user_id,
            request.offset(),
            request.page_size(),
        )
        .await
        .map_err(|e| ShortUrlError::Storage(e.to_string()))?;

        Ok(ShortUrlPage {
            items,
            info: PageInfo::new(&request, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, create_connection, ensure_schema};

    async fn setup_service() -> ShortUrlService {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();
        ShortUrlService::new(db)
    }

    fn user(key: &str) -> RecordId {
        RecordId::from_table_key("users", key)
    }

    #[test]
    fn test_generated_code_shape() {
        let code = generate_short_code();
        assert_eq!(code.as_str().len(), SHORT_CODE_LEN);
        assert!(
            code.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_validate_long_url() {
        assert_eq!(
            validate_long_url(" https://example.com/a?b=c ").unwrap(),
            "https://example.com/a?b=c"
        );
        assert!(validate_long_url("http://example.com").is_ok());

        for bad in ["", "example.com", "ftp://example.com/file", "javascript:alert(1)"] {
            assert!(
                matches!(validate_long_url(bad), Err(ShortUrlError::InvalidUrl(_))),
                "{}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let service = setup_service().await;

        let created = service
            .create(&user("alice"), "https://example.com/long/path")
            .await
            .unwrap();
        assert_eq!(created.short_code.as_str().len(), SHORT_CODE_LEN);

        let found = service.get(&user("alice"), &created.short_code).await.unwrap();
        assert_eq!(found.long_url, "https://example.com/long/path");
    }

    #[tokio::test]
    async fn test_other_users_code_is_not_found() {
        let service = setup_service().await;
        let created = service
            .create(&user("alice"), "https://example.com")
            .await
            .unwrap();

        let err = service.get(&user("bob"), &created.short_code).await.unwrap_err();
        assert_eq!(err, ShortUrlError::NotFound);
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_owner() {
        let service = setup_service().await;
        service.create(&user("alice"), "https://a.example.com").await.unwrap();
        service.create(&user("alice"), "https://b.example.com").await.unwrap();
        service.create(&user("bob"), "https://c.example.com").await.unwrap();

        let alice = service.list(&user("alice"), PageRequest::default()).await.unwrap();
        assert_eq!(alice.items.len(), 2);
        assert_eq!(alice.info.total, 2);
        let bob = service.list(&user("bob"), PageRequest::default()).await.unwrap();
        assert_eq!(bob.items.len(), 1);
    }

    #[tokio::test]
    async fn test_list_pages() {
        let service = setup_service().await;
        for i in 0..5 {
            service
                .create(&user("alice"), &format!("https://example.com/{}", i))
                .await
                .unwrap();
        }

        let first = service.list(&user("alice"), PageRequest::new(1, 2)).await.unwrap();
        let second = service.list(&user("alice"), PageRequest::new(2, 2)).await.unwrap();
        let last = service.list(&user("alice"), PageRequest::new(3, 2)).await.unwrap();
        let beyond = service.list(&user("alice"), PageRequest::new(4, 2)).await.unwrap();

        assert_eq!(first.items.len(), 2);
        assert_eq!(second.items.len(), 2);
        assert_eq!(last.items.len(), 1);
        assert!(beyond.items.is_empty());

        let mut codes: Vec<_> = [&first, &second, &last]
            .iter()
            .flat_map(|page| page.items.iter().map(|r| r.short_code.clone()))
            .collect();
        codes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        codes.dedup();
        assert_eq!(codes.len(), 5);

        assert_eq!(first.info.total_pages, 3);
        assert!(first.info.has_next && !first.info.has_previous);
        assert!(!last.info.has_next && last.info.has_previous);
    }

    #[tokio::test]
    async fn test_resolve_ignores_owner() {
        let service = setup_service().await;
        let created = service
            .create(&user("alice"), "https://example.com/public")
            .await
            .unwrap();

        let found = service.resolve(&created.short_code).await.unwrap();
        assert_eq!(found.long_url, "https://example.com/public");
        assert_eq!(
            service.resolve(&ShortCode::new("missing1")).await.unwrap_err(),
            ShortUrlError::NotFound
        );
    }

    #[test]
    fn test_page_request_defaults_and_caps() {
        let request = PageRequest::default();
        assert_eq!((request.page(), request.page_size(), request.offset()), (1, 10, 0));

        let request = PageRequest::new(0, -5);
        assert_eq!((request.page(), request.page_size()), (1, DEFAULT_PAGE_SIZE));

        let request = PageRequest::new(3, 1000);
        assert_eq!(request.page_size(), MAX_PAGE_SIZE);
        assert_eq!(request.offset(), 200);

        assert_eq!(PageRequest::new(i64::MAX, 100).offset(), i64::MAX);
    }

    #[test]
    fn test_page_info() {
        let info = PageInfo::new(&PageRequest::new(2, 10), 25);
        assert_eq!(
            info,
            PageInfo {
                page: 2,
                page_size: 10,
                total: 25,
                total_pages: 3,
                has_next: true,
                has_previous: true,
            }
        );

        let empty = PageInfo::new(&PageRequest::default(), 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next && !empty.has_previous);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_insert() {
        let service = setup_service().await;
        let err = service.create(&user("alice"), "not a url").await.unwrap_err();
        assert!(matches!(err, ShortUrlError::InvalidUrl(_)));
        let page = service.list(&user("alice"), PageRequest::default()).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.info.total, 0);
    }
}
