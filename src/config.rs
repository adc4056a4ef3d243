use std::env;

use tracing::warn;

use crate::auth::AuthType;

pub const DEFAULT_SESSION_NAME: &str = "session_id";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// HTTP service settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Cookie carrying the session id (`SESSION_NAME`)
    pub session_name: String,
    /// Authenticator guarding `/api/v1` (`AUTH_TYPE`). `None` leaves it open.
    pub auth_type: Option<AuthType>,
    pub host: String,
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let auth_type = env::var("AUTH_TYPE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .and_then(|value| match value.parse::<AuthType>() {
                Ok(auth_type) => Some(auth_type),
                Err(e) => {
                    warn!("Ignoring AUTH_TYPE: {}", e);
                    None
                }
            });

        let port = match env::var("API_PORT") {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                warn!("Invalid API_PORT '{}', using {}", value, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };

        Self {
            session_name: env::var("SESSION_NAME")
                .unwrap_or_else(|_| DEFAULT_SESSION_NAME.to_string()),
            auth_type,
            host: env::var("API_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port,
        }
    }
}

impl ServiceConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
