//! Request authenticators.
//!
//! An [`Authenticator`] resolves the current user from request headers.
//! [`BasicAuth`] reads an `Authorization: Basic` header; [`SessionAuth`]
//! reads a session cookie and resolves it through a [`SessionStore`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderMap, header};
use tracing::{debug, error};

use super::password::verify_password;
use super::path_matcher::{ExcludedPath, requires_auth};
use super::session_store::SessionStore;
use super::user_store::{UserLookup, UserStore};
use crate::db::schema::UserRecord;
use crate::types::{SessionId, UserId};

/// Which authenticator guards the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// `Authorization: Basic` credentials on every request
    BasicAuth,
    /// Session cookie backed by the in-memory store
    SessionAuth,
    /// Session cookie backed by the `session` table
    SessionDbAuth,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicAuth => "basic_auth",
            Self::SessionAuth => "session_auth",
            Self::SessionDbAuth => "session_db_auth",
        }
    }

    pub fn uses_sessions(&self) -> bool {
        !matches!(self, Self::BasicAuth)
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "basic_auth" => Ok(Self::BasicAuth),
            "session_auth" => Ok(Self::SessionAuth),
            "session_db_auth" => Ok(Self::SessionDbAuth),
            other => Err(format!(
                "unknown auth type '{}', expected basic_auth, session_auth or session_db_auth",
                other
            )),
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Whether `path` needs a resolved user. See [`requires_auth`].
    fn require_auth(&self, path: &str, excluded: &[ExcludedPath]) -> bool {
        requires_auth(path, excluded)
    }

    /// Raw `Authorization` header value.
    fn authorization_header<'a>(&self, headers: Option<&'a HeaderMap>) -> Option<&'a str> {
        headers?.get(header::AUTHORIZATION)?.to_str().ok()
    }

    /// Session id carried by the request, for cookie based authenticators.
    fn session_cookie(&self, _headers: Option<&HeaderMap>) -> Option<String> {
        None
    }

    /// User making the request, if any.
    async fn current_user(&self, headers: Option<&HeaderMap>) -> Option<UserRecord>;
}

/// Value of cookie `name` across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Payload of a `Basic <base64>` header.
pub fn extract_base64_authorization_header(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Basic ")
}

/// Decode the base64 payload as UTF-8.
pub fn decode_base64_authorization_header(encoded: &str) -> Option<String> {
    let bytes = STANDARD.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

/// Split `email:password` on the first colon. Passwords may contain `:`.
pub fn extract_user_credentials(decoded: &str) -> Option<(&str, &str)> {
    decoded.split_once(':')
}

/// Credentials sent with every request.
#[derive(Clone)]
pub struct BasicAuth {
    users: UserStore,
}

impl BasicAuth {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    /// User whose email and password match, or `None`.
    pub async fn user_object_from_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Option<UserRecord> {
        let user = match self.users.find_user_by(UserLookup::Email(email)).await {
            Ok(user) => user?,
            Err(e) => {
                error!(error = %e, "User lookup failed during basic auth");
                return None;
            }
        };

        if verify_password(&user.hashed_password, password) {
            Some(user)
        } else {
            debug!("Basic auth password mismatch");
            None
        }
    }
}

#[async_trait]
impl Authenticator for BasicAuth {
    async fn current_user(&self, headers: Option<&HeaderMap>) -> Option<UserRecord> {
        let authorization = self.authorization_header(headers)?;
        let encoded = extract_base64_authorization_header(authorization)?;
        let decoded = decode_base64_authorization_header(encoded)?;
        let (email, password) = extract_user_credentials(&decoded)?;
        self.user_object_from_credentials(email, password).await
    }
}

/// Cookie sessions resolved through a [`SessionStore`].
#[derive(Clone)]
pub struct SessionAuth {
    sessions: Arc<dyn SessionStore>,
    users: UserStore,
    cookie_name: String,
}

impl SessionAuth {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        users: UserStore,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            users,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub async fn create_session(&self, user_id: &str) -> Option<SessionId> {
        self.sessions.create(user_id).await
    }

    pub async fn user_id_for_session_id(&self, session_id: &str) -> Option<UserId> {
        self.sessions.lookup(session_id).await
    }

    /// End the session carried by the request.
    ///
    /// `false` when there are no headers, no session cookie, or the
    /// session is unknown.
    pub async fn destroy_session(&self, headers: Option<&HeaderMap>) -> bool {
        let Some(session_id) = self.session_cookie(headers) else {
            return false;
        };
        if self.user_id_for_session_id(&session_id).await.is_none() {
            return false;
        }
        self.sessions.destroy(&session_id).await
    }
}

#[async_trait]
impl Authenticator for SessionAuth {
    fn session_cookie(&self, headers: Option<&HeaderMap>) -> Option<String> {
        cookie_value(headers?, &self.cookie_name)
    }

    async fn current_user(&self, headers: Option<&HeaderMap>) -> Option<UserRecord> {
        let session_id = self.session_cookie(headers)?;
        let user_id = self.user_id_for_session_id(&session_id).await?;

        match self.users.find_user_by(UserLookup::Id(&user_id)).await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, "User lookup failed for session");
                None
            }
        }
    }
}
