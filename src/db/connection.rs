use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use tracing::info;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "session_gate".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "auth".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    info!(
        url = %config.url,
        namespace = %config.namespace,
        database = %config.database,
        "Connecting to SurrealDB"
    );

    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define tables, fields and indexes. Safe to run on every start.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Provisioned user accounts
        "DEFINE TABLE IF NOT EXISTS users SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS institution_id ON TABLE users TYPE int;
         DEFINE FIELD IF NOT EXISTS name ON TABLE users TYPE string;
         DEFINE FIELD IF NOT EXISTS email ON TABLE users TYPE string;
         DEFINE FIELD IF NOT EXISTS password_hash ON TABLE users TYPE string;
         DEFINE FIELD IF NOT EXISTS phone_number ON TABLE users TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE users TYPE bool DEFAULT true;
         DEFINE FIELD IF NOT EXISTS created_by ON TABLE users TYPE option<record<users>>;
         DEFINE FIELD IF NOT EXISTS updated_by ON TABLE users TYPE option<record<users>>;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE users TYPE datetime DEFAULT time::now();
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE users TYPE datetime VALUE time::now();",

        // One row per login
        "DEFINE TABLE IF NOT EXISTS user_sessions SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE user_sessions TYPE record<users>;
         DEFINE FIELD IF NOT EXISTS session_code ON TABLE user_sessions TYPE string;
         DEFINE FIELD IF NOT EXISTS secret_key ON TABLE user_sessions TYPE string;
         DEFINE FIELD IF NOT EXISTS device_info ON TABLE user_sessions TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS ip_address ON TABLE user_sessions TYPE option<string>;
         DEFINE FIELD IF NOT EXISTS expires_at ON TABLE user_sessions TYPE datetime;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE user_sessions TYPE bool DEFAULT true;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user_sessions TYPE datetime DEFAULT time::now();
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE user_sessions TYPE datetime VALUE time::now();",

        // Shortened URLs owned by a user
        "DEFINE TABLE IF NOT EXISTS short_urls SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS user_id ON TABLE short_urls TYPE record<users>;
         DEFINE FIELD IF NOT EXISTS long_url ON TABLE short_urls TYPE string;
         DEFINE FIELD IF NOT EXISTS short_code ON TABLE short_urls TYPE string;
         DEFINE FIELD IF NOT EXISTS is_active ON TABLE short_urls TYPE bool DEFAULT true;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE short_urls TYPE datetime DEFAULT time::now();
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE short_urls TYPE datetime VALUE time::now();",

        // Uniqueness lives in the store, not in application code
        "DEFINE INDEX IF NOT EXISTS users_email ON TABLE users COLUMNS email UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_sessions_code ON TABLE user_sessions COLUMNS session_code UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_sessions_user ON TABLE user_sessions COLUMNS user_id;
         DEFINE INDEX IF NOT EXISTS short_urls_code ON TABLE short_urls COLUMNS short_code UNIQUE;
         DEFINE INDEX IF NOT EXISTS short_urls_user ON TABLE short_urls COLUMNS user_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}

/// Whether a SurrealDB error is a `UNIQUE` index violation.
pub fn is_unique_violation(err: &surrealdb::Error) -> bool {
    err.to_string().contains("already contains")
}
