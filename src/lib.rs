// Core modules
mod config;
pub mod db;
pub mod api;
pub mod auth;
pub mod logging;
pub mod redact;
pub mod types;

// Re-export key types and functions
pub use db::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use config::ServiceConfig;
pub use api::AppState;
pub use auth::{AuthError, AuthResult, AuthService, AuthType, UserStore};
pub use redact::{PiiRedactor, redact};
pub use types::{ResetToken, SessionId, UserId};

use anyhow::Result;
use axum::Router;

/// Convenience function to create the fully wired HTTP application.
///
/// Connects to the database, applies the schema, and builds the single
/// session store selected by `config.auth_type`. The returned state must be
/// shut down with [`AppState::shutdown`] when the server stops.
pub async fn create_app(db_config: DatabaseConfig, config: ServiceConfig) -> Result<(Router, AppState)> {
    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;

    let state = AppState::new(db, config);
    let router = api::create_router(state.clone());

    Ok((router, state))
}
