// Query helpers for the short URL tables.
//
// The auth tables have their own stores under `crate::auth`; these helpers
// back the short URL service, which only ever sees rows owned by the caller.

use crate::db::Db;
use crate::db::schema::*;
use crate::types::ShortCode;
use anyhow::{Result, anyhow};
use serde::Deserialize;
use surrealdb::RecordId;

pub struct QueryBuilder;

impl QueryBuilder {
    /// Insert a short URL.
    ///
    /// A duplicate `short_code` surfaces as the underlying `surrealdb::Error`
    /// so callers can detect the unique index violation and pick a new code.
    pub async fn create_short_url(db: &Db, data: &ShortUrlCreate) -> Result<ShortUrlRecord> {
        let mut res = db
            .query(
                r#"
                CREATE short_urls CONTENT {
                    user_id: $user_id,
                    long_url: $long_url,
                    short_code: $short_code,
                    is_active: true
                }
                "#,
            )
            .bind(("user_id", data.user_id.clone()))
            .bind(("long_url", data.long_url.clone()))
            .bind(("short_code", data.short_code.clone()))
            .await?
            .check()?;

        let created: Option<ShortUrlRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create short url record"))
    }

    /// Find an active short URL by code, restricted to its owner.
    pub async fn find_short_url(
        db: &Db,
        short_code: &ShortCode,
        user_id: &RecordId,
    ) -> Result<Option<ShortUrlRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM short_urls
                WHERE short_code = $short_code
                  AND user_id = $user_id
                  AND is_active = true
                LIMIT 1
                "#,
            )
            .bind(("short_code", short_code.clone()))
            .bind(("user_id", user_id.clone()))
            .await?;

        let found: Option<ShortUrlRecord> = res.take(0)?;
        Ok(found)
    }

    /// Find an active short URL by code, whoever owns it. Backs the public
    /// redirect.
    pub async fn find_active_short_url_by_code(
        db: &Db,
        short_code: &ShortCode,
    ) -> Result<Option<ShortUrlRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM short_urls
                WHERE short_code = $short_code AND is_active = true
                LIMIT 1
                "#,
            )
            .bind(("short_code", short_code.clone()))
            .await?;

        let found: Option<ShortUrlRecord> = res.take(0)?;
        Ok(found)
    }

    /// One page of a user's active short URLs, newest first, plus the total
    /// number of active short URLs the user owns.
    pub async fn list_short_urls(
        db: &Db,
        user_id: &RecordId,
        start: i64,
        limit: i64,
    ) -> Result<(Vec<ShortUrlRecord>, u64)> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM short_urls
                WHERE user_id = $user_id AND is_active = true
                ORDER BY created_at DESC, id DESC
                LIMIT $limit START $start;

                SELECT count() AS total FROM short_urls
                WHERE user_id = $user_id AND is_active = true
                GROUP ALL;
                "#,
            )
            .bind(("user_id", user_id.clone()))
            .bind(("limit", limit))
            .bind(("start", start))
            .await?
            .check()?;

        let rows: Vec<ShortUrlRecord> = res.take(0)?;
        // GROUP ALL yields no row at all when nothing matches.
        let total: Option<CountRow> = res.take(1)?;
        Ok((rows, total.map_or(0, |row| row.total)))
    }
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}
