use std::net::SocketAddr;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use session_gate::{
    AppState, AuthConfig, DEFAULT_API_RATE_LIMIT, DEFAULT_API_RATE_WINDOW_SECONDS,
    DEFAULT_LOGIN_RATE_LIMIT, DEFAULT_LOGIN_RATE_WINDOW_SECONDS, DEFAULT_TOKEN_TTL_SECONDS,
    DatabaseConfig, Db, MAX_TOKEN_TTL_SECONDS, SessionStore, SurrealSessionStore, UserCreate,
    UserStore, create_connection, create_router, ensure_schema, hash_password,
};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "session-gate")]
#[command(about = "Session-based authentication service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Server {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, env = "SESSION_GATE_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
        /// Lifetime of a session and its token, in seconds
        #[arg(
            long,
            env = "SESSION_TOKEN_TTL_SECS",
            default_value_t = DEFAULT_TOKEN_TTL_SECONDS,
            value_parser = clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL_SECONDS)
        )]
        token_ttl_secs: u64,
        /// Login attempts allowed per client within one window
        #[arg(long, env = "LOGIN_RATE_LIMIT", default_value_t = DEFAULT_LOGIN_RATE_LIMIT)]
        login_rate_limit: u32,
        #[arg(long, env = "LOGIN_RATE_WINDOW_SECS", default_value_t = DEFAULT_LOGIN_RATE_WINDOW_SECONDS)]
        login_rate_window_secs: u64,
        /// Requests allowed per client within one window on the other user routes
        #[arg(long, env = "API_RATE_LIMIT", default_value_t = DEFAULT_API_RATE_LIMIT)]
        api_rate_limit: u32,
        #[arg(long, env = "API_RATE_WINDOW_SECS", default_value_t = DEFAULT_API_RATE_WINDOW_SECONDS)]
        api_rate_window_secs: u64,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Provision a user account
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Plaintext password; stored only as an Argon2id hash
        #[arg(long, env = "SESSION_GATE_USER_PASSWORD")]
        password: String,
        #[arg(long, default_value_t = 1)]
        institution_id: i64,
        #[arg(long)]
        phone_number: Option<String>,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Disable a user account and revoke all of its sessions
    DeactivateUser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Log a user out everywhere
    RevokeSessions {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Delete expired and inactive sessions
    PurgeSessions {
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
}

async fn open_db(db_url: String) -> Result<Db> {
    let db_config = DatabaseConfig {
        url: db_url,
        ..Default::default()
    };
    info!("Using database url: {}", db_config.url);

    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;
    Ok(db)
}

/// Revoke every session of the user behind `email`.
async fn revoke_for_email(db: &Db, email: &str) -> Result<usize> {
    let Some(user) = UserStore::new(db.clone()).find_by_email(email).await? else {
        bail!("No user found with email '{}'", email);
    };

    let count = SurrealSessionStore::new(db.clone())
        .deactivate_all_for_user(&user.id)
        .await?;
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("session_gate=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            bind,
            db_url,
            token_ttl_secs,
            login_rate_limit,
            login_rate_window_secs,
            api_rate_limit,
            api_rate_window_secs,
        } => {
            let config = AuthConfig {
                token_ttl_seconds: token_ttl_secs,
                login_rate_limit,
                login_rate_window_seconds: login_rate_window_secs,
                api_rate_limit,
                api_rate_window_seconds: api_rate_window_secs,
            };
            config.validate()?;
            info!(
                token_ttl_secs,
                login_rate_limit,
                login_rate_window_secs,
                api_rate_limit,
                api_rate_window_secs,
                "Starting session gate on {}",
                bind
            );

            let db = open_db(db_url).await?;
            let app = create_router(AppState::new(db, &config)?);

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Server listening on http://{}", bind);

            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
        Commands::Init { db_url } => {
            info!("Initializing database...");
            open_db(db_url).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateUser {
            email,
            name,
            password,
            institution_id,
            phone_number,
            db_url,
        } => {
            if password.is_empty() {
                bail!("Password must not be empty");
            }
            let db = open_db(db_url).await?;

            let user = UserStore::new(db)
                .create_user(&UserCreate {
                    institution_id,
                    name,
                    email,
                    password_hash: hash_password(&password)?,
                    phone_number,
                    is_active: true,
                    created_by: None,
                })
                .await?;

            println!("User created successfully!");
            println!();
            println!("  ID:    {}", user.id);
            println!("  Email: {}", user.email);
            println!("  Name:  {}", user.name);
        }
        Commands::DeactivateUser { email, db_url } => {
            let db = open_db(db_url).await?;
            let users = UserStore::new(db.clone());

            let Some(user) = users.find_by_email(&email).await? else {
                println!("No user found with email '{}'.", email);
                return Ok(());
            };

            users.deactivate_user(&user.id, None).await?;
            let revoked = revoke_for_email(&db, &email).await?;
            println!(
                "User '{}' deactivated; {} active session(s) revoked.",
                user.email, revoked
            );
        }
        Commands::RevokeSessions { email, db_url } => {
            let db = open_db(db_url).await?;
            let revoked = revoke_for_email(&db, &email).await?;
            println!("Revoked {} active session(s) for '{}'.", revoked, email);
        }
        Commands::PurgeSessions { db_url } => {
            let db = open_db(db_url).await?;
            let removed = SurrealSessionStore::new(db).purge_expired().await?;
            println!("Removed {} expired or inactive session(s).", removed);
        }
    }

    Ok(())
}
