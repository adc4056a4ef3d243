use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use tracing::{error, info};
use session_auth::db::schema::user_log_line;
use session_auth::redact::{DEFAULT_MASK, DEFAULT_SEPARATOR, PII_FIELDS};
use session_auth::{AuthType, DatabaseConfig, PiiRedactor, ServiceConfig, UserStore, create_app};

#[derive(Parser)]
#[command(name = "session-auth")]
#[command(about = "Session authentication service with PII-safe logging")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (user service and /api/v1)
    Serve {
        /// Listen host (falls back to API_HOST, then 0.0.0.0)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (falls back to API_PORT, then 5000)
        #[arg(long)]
        port: Option<u16>,
        /// basic_auth, session_auth or session_db_auth (falls back to AUTH_TYPE)
        #[arg(long)]
        auth_type: Option<AuthType>,
        /// Session cookie name (falls back to SESSION_NAME, then session_id)
        #[arg(long)]
        session_name: Option<String>,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Log every stored user through the redacting logger
    DumpUsers {
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
    /// Redact `key=value` lines from stdin to stdout
    Redact {
        /// Comma-separated fields to mask (defaults to the PII fields)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        #[arg(long, default_value = DEFAULT_MASK)]
        mask: String,
        #[arg(long, default_value = DEFAULT_SEPARATOR)]
        separator: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    session_auth::logging::init_tracing()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            host,
            port,
            auth_type,
            session_name,
            db_url,
        } => {
            let defaults = ServiceConfig::default();
            let config = ServiceConfig {
                session_name: session_name.unwrap_or(defaults.session_name),
                auth_type: auth_type.or(defaults.auth_type),
                host: host.unwrap_or(defaults.host),
                port: port.unwrap_or(defaults.port),
            };
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for HTTP server: {}", db_config.url);

            let addr = config.bind_addr();
            let (app, state) = create_app(db_config, config).await?;

            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Server listening on http://{}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            state.shutdown().await;
            info!("Server stopped");
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = session_auth::create_connection(db_config).await?;
            session_auth::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::DumpUsers { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            let db = session_auth::create_connection(db_config).await?;
            session_auth::ensure_schema(&db).await?;

            let users = UserStore::new(db).list_users().await?;
            for user in &users {
                info!(target: "user_data", "{}", user_log_line(user));
            }
            info!("Filtered {} rows", users.len());
        }
        Commands::Redact {
            fields,
            mask,
            separator,
        } => {
            let redactor = if fields.is_empty() {
                PiiRedactor::new(PII_FIELDS, &mask, &separator)?
            } else {
                PiiRedactor::new(&fields, &mask, &separator)?
            };

            let stdin = io::stdin();
            let mut stdout = io::stdout().lock();
            for line in stdin.lock().lines() {
                writeln!(stdout, "{}", redactor.redact(&line?))?;
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
